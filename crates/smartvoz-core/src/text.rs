//! Text normalisation shared by the lexical embedder and the dialogue
//! policy: lowercase, strip Spanish diacritics, split into word tokens.

/// Lowercase and replace accented Latin letters with their base letter.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Folded alphanumeric tokens of `text`.
pub fn tokens(text: &str) -> Vec<String> {
    fold(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when every token of `needle` appears among the tokens of `haystack`.
///
/// "Jorge Urioste" matches "Jorge Luis Urioste" but not "Jorge Perez".
pub fn tokens_subset(needle: &str, haystack: &str) -> bool {
    let needle = tokens(needle);
    if needle.is_empty() {
        return false;
    }
    let haystack = tokens(haystack);
    needle.iter().all(|t| haystack.contains(t))
}
