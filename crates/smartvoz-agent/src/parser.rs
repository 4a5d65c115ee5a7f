//! Caller utterance parsing: identity claims and yes/no answers.

use regex::Regex;
use std::sync::LazyLock;

use smartvoz_core::text;

/// A caller's stated name and company, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaim {
    pub name: String,
    pub company: String,
}

// =============================================================================
// Identity
// =============================================================================

/// An introduction verb followed by the rest of the clause:
/// "soy ...", "me llamo ...", "my name is ...".
static INTRODUCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(?:soy|me\s+llamo|mi\s+nombre\s+es|le\s+habla|habla|my\s+name\s+is|this\s+is|i\s+am|i'm)\s+
        (?P<rest>[^.;:!?¿¡]+)",
    )
    .expect("Invalid introduction regex")
});

/// Words joining a name to a company: "de", "y trabajo en", "from", ...
static CONNECTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \s*,?\s+
        (?:y\s+)?
        (?:trabajo\s+(?:en|para)|vengo\s+de|llamo\s+de|de\s+parte\s+de|del|desde|de|
           working\s+(?:at|for)|and\s+i\s+work\s+(?:at|for)|from|at|with)
        \s+
        (?:la\s+empresa\s+|la\s+compa[ñn][ií]a\s+|the\s+company\s+)?",
    )
    .expect("Invalid connector regex")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\s,]+|,").expect("Invalid word regex"));

/// "Jorge Urioste, Publicarte"
static NAME_COMMA_COMPANY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<name>\p{L}[\p{L}'\s]*?)\s*,\s*(?P<company>\p{L}[^,;:!?¿¡]*?)[\s.!?]*$")
        .expect("Invalid name/company regex")
});

/// Words that end a company name when the caller keeps talking.
const COMPANY_TERMINATORS: &[&str] = &[
    "y", "and", "porque", "pero", "but", "tengo", "necesito", "quisiera", "quiero", "i", "me",
];

/// Extract a name and company from an introduction. When the connector is
/// ambiguous this is the first of [`identity_candidates`].
pub fn parse_identity(utterance: &str) -> Option<IdentityClaim> {
    identity_candidates(utterance).into_iter().next()
}

/// Every plausible name/company split of an introduction, best first.
///
/// Names may contain connector words ("Jorge de la Vega de Publicarte"),
/// so each connector is a possible split point. Splits at later connectors
/// come first; the caller checks them against evidence in order.
pub fn identity_candidates(utterance: &str) -> Vec<IdentityClaim> {
    if let Some(rest) = INTRODUCTION_RE
        .captures(utterance)
        .and_then(|caps| caps.name("rest"))
    {
        let claims = split_introduction(rest.as_str());
        if !claims.is_empty() {
            return claims;
        }
    }

    let Some(caps) = NAME_COMMA_COMPANY_RE.captures(utterance) else {
        return Vec::new();
    };
    let name = clean_name(caps.name("name").map_or("", |m| m.as_str()));
    let company = clean_company(caps.name("company").map_or("", |m| m.as_str()));
    if !looks_like_full_name(&name) {
        return Vec::new();
    }
    claim_if_valid(name, company).into_iter().collect()
}

fn split_introduction(rest: &str) -> Vec<IdentityClaim> {
    let connectors: Vec<(usize, usize)> = CONNECTOR_RE
        .find_iter(rest)
        .map(|m| (m.start(), m.end()))
        .collect();
    let Some(&(_, first_end)) = connectors.first() else {
        return Vec::new();
    };

    // The clause ends at the first comma or follow-up word after the first
    // connector that is not itself part of a connector.
    let inside_connector = |pos: usize| connectors.iter().any(|&(s, e)| pos >= s && pos < e);
    let mut cut = rest.len();
    let mut first_word = true;
    for word in WORD_RE.find_iter(&rest[first_end..]) {
        let pos = first_end + word.start();
        if inside_connector(pos) {
            first_word = true;
            continue;
        }
        let ends_clause = word.as_str() == ","
            || (!first_word && COMPANY_TERMINATORS.contains(&text::fold(word.as_str()).as_str()));
        if ends_clause {
            cut = pos;
            break;
        }
        first_word = false;
    }

    let mut claims: Vec<IdentityClaim> = Vec::new();
    for &(start, end) in connectors.iter().rev() {
        if end > cut {
            continue;
        }
        let name = clean_name(&rest[..start]);
        if name.contains(',') {
            continue;
        }
        let company = rest[end..cut].split(',').next().unwrap_or_default();
        if let Some(claim) = claim_if_valid(name, clean_company(company)) {
            if !claims.contains(&claim) {
                claims.push(claim);
            }
        }
    }
    claims
}

fn claim_if_valid(name: String, company: String) -> Option<IdentityClaim> {
    if name.is_empty() || company.is_empty() {
        return None;
    }
    if name.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(IdentityClaim { name, company })
}

const GREETINGS: &[&str] = &["hola", "buenas", "buenos", "buen", "hello", "hi", "alo", "si"];

/// Without an introduction verb, only a two-word name that does not start
/// with a greeting is taken as a name.
fn looks_like_full_name(name: &str) -> bool {
    let tokens = text::tokens(name);
    tokens.len() >= 2 && !GREETINGS.contains(&tokens[0].as_str())
}

fn clean_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_company(raw: &str) -> String {
    let mut words = Vec::new();
    for word in raw.split_whitespace() {
        if !words.is_empty() && COMPANY_TERMINATORS.contains(&text::fold(word).as_str()) {
            break;
        }
        words.push(word);
    }
    words.join(" ")
}

// =============================================================================
// Confirmation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Accept,
    Reject,
}

/// Plain no.
const REJECT_WORDS: &[&str] = &["no", "tampoco", "nada", "negativo", "nope", "not", "didn", "nunca"];

const NEGATIONS: &[&str] = &["no", "not", "nunca", "never", "didn", "doesn"];

/// The problem is still there.
const PERSIST_WORDS: &[&str] = &["sigue", "siguen", "persiste", "continua", "still"];

const ACCEPT_WORDS: &[&str] = &[
    "si", "claro", "correcto", "funciono", "funciona", "resuelto", "resolvio", "perfecto",
    "listo", "vale", "exacto", "yes", "yeah", "yep", "ok", "okay", "solved", "works", "worked",
];

/// Verbs that turn into a rejection when negated: "no funcionó".
const SUCCESS_VERBS: &[&str] = &[
    "funciona", "funciono", "resolvio", "resuelto", "sirvio", "sirve", "anda", "andan",
    "arreglo", "work", "works", "worked", "solved", "help", "helped",
];

/// Clitics and auxiliaries allowed between "no" and a success verb.
/// The `t` is what is left of "didn't" after tokenizing.
const NEGATION_FILLERS: &[&str] = &["me", "te", "lo", "la", "le", "se", "nos", "ha", "esta", "t"];

/// After "ya no", these mean the problem is gone: "ya no tengo el problema".
/// Bare verbs are left out so "ya no tengo internet" still rejects.
const GONE_WORDS: &[&str] = &[
    "problema", "problemas", "falla", "fallas", "error", "errores", "inconveniente", "pasa",
    "sucede", "sigue", "persiste", "problem", "issue",
];

const CONTRAST_WORDS: &[&str] = &["pero", "but", "aunque"];

/// Interpret a yes/no answer to "did this solve your problem?".
///
/// After a contrast word ("sí, pero sigue fallando") the tail decides.
/// Otherwise, in order: a problem reported gone ("ya no tengo el
/// problema") accepts; a negated success verb ("no funcionó") or a
/// persisting problem rejects; a leading yes or no decides; and finally
/// any yes or no word anywhere.
pub fn parse_confirmation(utterance: &str) -> Option<Confirmation> {
    let tokens = text::tokens(utterance);
    if let Some(pos) = tokens
        .iter()
        .rposition(|t| CONTRAST_WORDS.contains(&t.as_str()))
    {
        if let Some(answer) = judge_confirmation(&tokens[pos + 1..]) {
            return Some(answer);
        }
        return judge_confirmation(&tokens[..pos]);
    }
    judge_confirmation(&tokens)
}

fn judge_confirmation(tokens: &[String]) -> Option<Confirmation> {
    let is = |t: &String, set: &[&str]| set.contains(&t.as_str());

    let problem_gone = tokens.windows(2).enumerate().any(|(i, pair)| {
        let ya_no = pair[0] == "ya" && pair[1] == "no";
        let no_longer = pair[0] == "no" && pair[1] == "longer";
        (ya_no || no_longer) && tokens[i + 2..].iter().any(|t| is(t, GONE_WORDS))
    });
    if problem_gone {
        return Some(Confirmation::Accept);
    }

    let negated_success = tokens.iter().enumerate().any(|(i, t)| {
        is(t, NEGATIONS)
            && tokens[i + 1..]
                .iter()
                .find(|&next| !is(next, NEGATION_FILLERS))
                .is_some_and(|next| is(next, SUCCESS_VERBS))
    });
    if negated_success || tokens.iter().any(|t| is(t, PERSIST_WORDS)) {
        return Some(Confirmation::Reject);
    }

    match tokens.first() {
        Some(first) if is(first, ACCEPT_WORDS) => return Some(Confirmation::Accept),
        Some(first) if is(first, REJECT_WORDS) => return Some(Confirmation::Reject),
        _ => {}
    }

    if tokens.iter().any(|t| is(t, REJECT_WORDS)) {
        return Some(Confirmation::Reject);
    }
    if tokens.iter().any(|t| is(t, ACCEPT_WORDS)) {
        return Some(Confirmation::Accept);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(name: &str, company: &str) -> Option<IdentityClaim> {
        Some(IdentityClaim {
            name: name.to_string(),
            company: company.to_string(),
        })
    }

    #[test]
    fn test_parse_identity_spanish() {
        assert_eq!(
            parse_identity("Hola, soy Jorge Urioste de Publicarte"),
            claim("Jorge Urioste", "Publicarte")
        );
        assert_eq!(
            parse_identity("Me llamo Carlos Benitez y trabajo en Rio Telecom."),
            claim("Carlos Benitez", "Rio Telecom")
        );
        assert_eq!(
            parse_identity("Mi nombre es Maria Fernanda Lopez, de la empresa Andes Logistica"),
            claim("Maria Fernanda Lopez", "Andes Logistica")
        );
    }

    #[test]
    fn test_parse_identity_english() {
        assert_eq!(
            parse_identity("Hi, my name is Jorge Urioste from Publicarte"),
            claim("Jorge Urioste", "Publicarte")
        );
        assert_eq!(
            parse_identity("I'm Carlos Benitez and I work at Rio Telecom"),
            claim("Carlos Benitez", "Rio Telecom")
        );
    }

    #[test]
    fn test_parse_identity_comma_form() {
        assert_eq!(
            parse_identity("Jorge Urioste, Publicarte"),
            claim("Jorge Urioste", "Publicarte")
        );
    }

    #[test]
    fn test_comma_form_ignores_greetings() {
        assert_eq!(parse_identity("Hola, buenos días"), None);
        assert_eq!(parse_identity("Buenas tardes, Publicarte"), None);
    }

    #[test]
    fn test_company_stops_at_followup() {
        assert_eq!(
            parse_identity("Soy Jorge Urioste de Publicarte y tengo un problema con internet"),
            claim("Jorge Urioste", "Publicarte")
        );
    }

    #[test]
    fn test_parse_identity_rejects_incomplete() {
        assert_eq!(parse_identity("Soy Jorge Urioste"), None);
        assert_eq!(parse_identity("¿Qué tiempo hace hoy?"), None);
        assert_eq!(parse_identity(""), None);
    }

    #[test]
    fn test_parse_confirmation() {
        assert_eq!(parse_confirmation("Sí, ya funciona"), Some(Confirmation::Accept));
        assert_eq!(parse_confirmation("claro que sí"), Some(Confirmation::Accept));
        assert_eq!(parse_confirmation("Yes, thanks"), Some(Confirmation::Accept));
        assert_eq!(parse_confirmation("No funcionó"), Some(Confirmation::Reject));
        assert_eq!(parse_confirmation("el problema sigue"), Some(Confirmation::Reject));
        assert_eq!(parse_confirmation("¿perdón?"), None);
    }

    #[test]
    fn test_confirmation_problem_gone_is_accept() {
        assert_eq!(
            parse_confirmation("Sí, ya no tengo el problema"),
            Some(Confirmation::Accept)
        );
        assert_eq!(
            parse_confirmation("Ya no hay ningún problema, gracias"),
            Some(Confirmation::Accept)
        );
        assert_eq!(
            parse_confirmation("ya no me sale el error"),
            Some(Confirmation::Accept)
        );
        assert_eq!(
            parse_confirmation("I no longer have the issue"),
            Some(Confirmation::Accept)
        );
    }

    #[test]
    fn test_confirmation_leading_yes_wins_over_later_no() {
        assert_eq!(
            parse_confirmation("Sí, no hace falta nada más"),
            Some(Confirmation::Accept)
        );
        assert_eq!(parse_confirmation("Claro, no hay drama"), Some(Confirmation::Accept));
    }

    #[test]
    fn test_confirmation_negated_success_is_reject() {
        assert_eq!(parse_confirmation("No, no funcionó"), Some(Confirmation::Reject));
        assert_eq!(
            parse_confirmation("Sí lo probé pero no me funcionó"),
            Some(Confirmation::Reject)
        );
        assert_eq!(parse_confirmation("ya no funciona"), Some(Confirmation::Reject));
        assert_eq!(parse_confirmation("ya no tengo internet"), Some(Confirmation::Reject));
        assert_eq!(parse_confirmation("it didn't work"), Some(Confirmation::Reject));
    }

    #[test]
    fn test_confirmation_contrast_tail_decides() {
        assert_eq!(
            parse_confirmation("Sí, pero sigue fallando"),
            Some(Confirmation::Reject)
        );
        assert_eq!(
            parse_confirmation("No sé qué pasó, pero ya funciona"),
            Some(Confirmation::Accept)
        );
        assert_eq!(parse_confirmation("Sí, pero..."), Some(Confirmation::Accept));
    }

    #[test]
    fn test_names_containing_connectors() {
        assert_eq!(
            parse_identity("Soy Jorge de la Vega de Publicarte"),
            claim("Jorge de la Vega", "Publicarte")
        );
        assert_eq!(
            parse_identity("Me llamo Ana del Río y trabajo en Rio Telecom"),
            claim("Ana del Río", "Rio Telecom")
        );
        assert_eq!(
            parse_identity("Soy Luis de León, de la empresa Andes Logistica"),
            claim("Luis de León", "Andes Logistica")
        );
    }

    #[test]
    fn test_every_connector_split_is_a_candidate() {
        let candidates = identity_candidates("Soy Jorge de la Vega de Publicarte");
        assert_eq!(
            candidates,
            vec![
                IdentityClaim {
                    name: "Jorge de la Vega".into(),
                    company: "Publicarte".into(),
                },
                IdentityClaim {
                    name: "Jorge".into(),
                    company: "la Vega de Publicarte".into(),
                },
            ]
        );
    }

    #[test]
    fn test_followup_connector_is_not_a_split() {
        // "de internet" is after the follow-up "y tengo", not part of the company.
        assert_eq!(
            identity_candidates("Soy Jorge Urioste de Publicarte y tengo un problema de internet"),
            vec![IdentityClaim {
                name: "Jorge Urioste".into(),
                company: "Publicarte".into(),
            }]
        );
    }
}
