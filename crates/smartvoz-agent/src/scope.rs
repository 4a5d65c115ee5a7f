//! Topic guard: keeps the dialogue on the caller, their company and their
//! issue.

use smartvoz_core::config::ConversationConfig;
use smartvoz_core::text;

/// Detects utterances outside the support topic.
///
/// Keywords are matched on folded word tokens, so "Fútbol" matches
/// "futbol", and multi-word keywords ("capital de") must appear as a
/// contiguous token sequence.
#[derive(Debug, Clone)]
pub struct ScopeGuard {
    keywords: Vec<Vec<String>>,
}

impl ScopeGuard {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords: Vec<Vec<String>> = keywords
            .into_iter()
            .map(|k| text::tokens(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();
        keywords.sort();
        keywords.dedup();
        Self { keywords }
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(&config.off_topic_keywords)
    }

    /// True when `utterance` hits an off-topic keyword and does not mention
    /// the caller's company. A company mention keeps borderline utterances
    /// ("the Publicarte football sponsorship invoice") in scope.
    pub fn is_off_topic(&self, utterance: &str, company: Option<&str>) -> bool {
        let tokens = text::tokens(utterance);
        let hit = self
            .keywords
            .iter()
            .any(|kw| tokens.windows(kw.len()).any(|w| w == kw.as_slice()));
        if !hit {
            return false;
        }
        match company {
            Some(company) => !text::tokens_subset(company, utterance),
            None => true,
        }
    }
}
