//! Conversation validator: the per-call dialogue policy.
//!
//! Retrieval is fuzzy, decisions are not. The validator never reads the
//! synthesized answer to decide anything; identity and protocol matches are
//! computed from the typed fields of each [`EvidenceHit`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use smartvoz_core::config::ConversationConfig;
use smartvoz_core::text;
use smartvoz_core::types::{DocumentKind, Protocol, ResolutionKind, VerifiedCaller};
use smartvoz_vector::{EvidenceHit, RetrievalGateway, SearchResult, NO_EVIDENCE_ANSWER};

use crate::error::{AgentError, AgentResult};
use crate::parser::{identity_candidates, parse_confirmation, Confirmation, IdentityClaim};
use crate::phrases;
use crate::scope::ScopeGuard;
use crate::state::ConversationState;

/// Where the validator gets its evidence.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn search(&self, query: &str, top_k: Option<i64>) -> SearchResult;
}

#[async_trait]
impl EvidenceSource for RetrievalGateway {
    async fn search(&self, query: &str, top_k: Option<i64>) -> SearchResult {
        RetrievalGateway::search(self, query, top_k).await
    }
}

/// The agent's answer to one caller utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
    pub state: ConversationState,
    /// The agent has nothing more to say; the call should end.
    pub end_call: bool,
}

// =============================================================================
// Matching on typed evidence
// =============================================================================

/// Find a client in `hits` whose name matches the claim and whose company
/// reference matches the claimed company.
///
/// A company reference counts when its inline name matches, or when a
/// company document in the same evidence has a matching name and the
/// client's reference points at that company's id. A name match alone is
/// never enough.
pub fn match_identity(claim: &IdentityClaim, hits: &[EvidenceHit]) -> Option<VerifiedCaller> {
    let claim_tokens = text::tokens(&claim.name);
    let known_companies: Vec<_> = hits
        .iter()
        .filter(|h| h.matched_type == DocumentKind::Company)
        .flat_map(|h| h.companies.iter())
        .filter(|c| company_matches(&claim.company, &c.name))
        .collect();

    for client in hits.iter().flat_map(|h| h.clients.iter()) {
        if !name_matches(&claim_tokens, &client.name) {
            continue;
        }
        let inline = client
            .companies
            .iter()
            .find(|c| company_matches(&claim.company, &c.name));
        let resolved = inline.or_else(|| {
            client
                .companies
                .iter()
                .find(|c| known_companies.iter().any(|k| k.id == c.id))
        });
        if let Some(company) = resolved {
            return Some(VerifiedCaller {
                client_id: client.id.clone(),
                name: client.name.clone(),
                company: company.clone(),
            });
        }
    }
    None
}

/// A one-word claim must equal the full client name; longer claims may be
/// a subset ("Jorge Urioste" for "Jorge Luis Urioste").
fn name_matches(claim_tokens: &[String], client_name: &str) -> bool {
    let client_tokens = text::tokens(client_name);
    if claim_tokens.is_empty() {
        return false;
    }
    if claim_tokens.len() == 1 {
        return client_tokens == claim_tokens;
    }
    claim_tokens.iter().all(|t| client_tokens.contains(t))
}

fn company_matches(stated: &str, actual: &str) -> bool {
    text::tokens_subset(stated, actual) || text::tokens_subset(actual, stated)
}

const ISSUE_STOPWORDS: &[&str] = &[
    "hola", "tengo", "tiene", "tenemos", "problema", "problemas", "ayuda", "ayudar", "necesito",
    "quiero", "quisiera", "para", "pero", "porque", "como", "cuando", "desde", "donde", "esta",
    "estan", "este", "esto", "eso", "mucho", "muy", "todo", "todos", "nada", "hace", "sigue",
    "favor", "gracias", "bueno", "buenas", "sobre", "with", "have", "that", "this", "from",
    "about", "please", "need", "help", "problem", "issue", "there", "what", "when",
];

/// Folded content words of an issue description.
fn content_words(issue: &str) -> Vec<String> {
    text::tokens(issue)
        .into_iter()
        .filter(|t| t.chars().count() >= 4 && !ISSUE_STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Equal words, or words of five or more letters sharing their first four
/// ("cobro" / "cobrado", "factura" / "facturacion").
fn words_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (la, lb) = (a.chars().count(), b.chars().count());
    la >= 5 && lb >= 5 && a.chars().take(4).eq(b.chars().take(4))
}

/// The best-ranked protocol hit whose name, description, reason or steps
/// share a content word with the issue.
///
/// Nearest-neighbour search always returns something, so a protocol hit
/// only counts when the caller's own words confirm it.
pub fn match_protocol<'a>(issue: &str, hits: &'a [EvidenceHit]) -> Option<&'a Protocol> {
    let words = content_words(issue);
    if words.is_empty() {
        return None;
    }
    hits.iter()
        .filter_map(|h| h.protocol.as_ref())
        .find(|protocol| {
            let mut corpus = format!("{} {}", protocol.name, protocol.description);
            if let Some(reason) = &protocol.reason {
                corpus.push(' ');
                corpus.push_str(&reason.name);
                corpus.push(' ');
                corpus.push_str(&reason.description);
            }
            for step in &protocol.steps {
                corpus.push(' ');
                corpus.push_str(&step.text);
            }
            let protocol_words = text::tokens(&corpus);
            words
                .iter()
                .any(|w| protocol_words.iter().any(|p| words_match(w, p)))
        })
}

/// Names of the caller's company services that share a content word with
/// the issue. Other companies' service groups are ignored.
pub fn related_services(issue: &str, company_id: &str, hits: &[EvidenceHit]) -> Vec<String> {
    let words = content_words(issue);
    if words.is_empty() {
        return Vec::new();
    }
    let mut names: Vec<String> = Vec::new();
    let own_groups = hits.iter().filter(|h| {
        h.matched_type == DocumentKind::ServiceGroup && h.companies.iter().any(|c| c.id == company_id)
    });
    for service in own_groups.flat_map(|h| h.services.iter()) {
        let related = text::tokens(service)
            .iter()
            .any(|s| words.iter().any(|w| words_match(w, s)));
        if related && !names.contains(service) {
            names.push(service.clone());
        }
    }
    names
}

// =============================================================================
// Validator
// =============================================================================

/// One call's dialogue state machine.
pub struct ConversationValidator {
    state: ConversationState,
    evidence: Arc<dyn EvidenceSource>,
    scope: ScopeGuard,
    agent_name: String,
    max_identity_attempts: u32,
    identity_attempts: u32,
    caller: Option<VerifiedCaller>,
    resolution: Option<ResolutionKind>,
    history: Vec<ConversationState>,
}

impl ConversationValidator {
    pub fn new(evidence: Arc<dyn EvidenceSource>, config: &ConversationConfig) -> Self {
        Self {
            state: ConversationState::AwaitingIdentity,
            evidence,
            scope: ScopeGuard::from_config(config),
            agent_name: config.agent_name.clone(),
            max_identity_attempts: config.max_identity_attempts.max(1),
            identity_attempts: 0,
            caller: None,
            resolution: None,
            history: vec![ConversationState::AwaitingIdentity],
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// Every state entered so far, in order, starting with AwaitingIdentity.
    pub fn history(&self) -> &[ConversationState] {
        &self.history
    }

    pub fn caller(&self) -> Option<&VerifiedCaller> {
        self.caller.as_ref()
    }

    pub fn resolution(&self) -> Option<ResolutionKind> {
        self.resolution
    }

    /// Unknown with no identity attempts left.
    pub fn is_exhausted(&self) -> bool {
        self.state == ConversationState::Unknown
            && self.identity_attempts >= self.max_identity_attempts
    }

    pub fn greeting(&self) -> String {
        phrases::greeting(&self.agent_name)
    }

    fn transition(&mut self, target: ConversationState) -> AgentResult<()> {
        if !self.state.can_transition_to(&target) {
            return Err(AgentError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        debug!("Conversation state: {} -> {}", self.state, target);
        self.state = target;
        self.history.push(target);
        Ok(())
    }

    fn reply(&self, text: impl Into<String>) -> AgentReply {
        AgentReply {
            text: text.into(),
            state: self.state,
            end_call: self.state.is_terminal() || self.is_exhausted(),
        }
    }

    /// Handle one caller utterance.
    pub async fn handle(&mut self, utterance: &str) -> AgentResult<AgentReply> {
        use ConversationState::*;
        match self.state {
            Resolved | Escalated => Err(AgentError::ConversationClosed(self.state)),
            AwaitingIdentity | Unknown => self.on_identity(utterance).await,
            AwaitingIssue => self.on_issue(utterance).await,
            AwaitingConfirmation => self.on_confirmation(utterance),
            // Transient states are never left pending between utterances.
            Validating | Validated | ResolvingViaProtocol | ResolvingViaGenerated => {
                Err(AgentError::InvalidTransition {
                    from: self.state,
                    to: self.state,
                })
            }
        }
    }

    async fn on_identity(&mut self, utterance: &str) -> AgentResult<AgentReply> {
        if self.is_exhausted() {
            return Ok(self.reply(phrases::UNKNOWN_FINAL));
        }

        // An off-topic remark can look like an introduction ("soy fan del
        // fútbol") and must not use up an attempt.
        if self.scope.is_off_topic(utterance, None) {
            debug!(state = %self.state, "Refused off-topic utterance");
            return Ok(self.reply(phrases::OFF_TOPIC));
        }

        let candidates = identity_candidates(utterance);
        if candidates.is_empty() {
            if self.state == ConversationState::Unknown {
                return Ok(self.reply(phrases::UNKNOWN_RETRY));
            }
            return Ok(self.reply(phrases::ASK_IDENTITY));
        }

        let outcome = self.validate_candidates(&candidates).await?;
        match outcome {
            ConversationState::Validated => {
                self.transition(ConversationState::AwaitingIssue)?;
                let name = self
                    .caller
                    .as_ref()
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| candidates[0].name.clone());
                Ok(self.reply(phrases::validated(&name)))
            }
            _ if self.is_exhausted() => Ok(self.reply(phrases::UNKNOWN_FINAL)),
            _ => Ok(self.reply(phrases::UNKNOWN_RETRY)),
        }
    }

    /// Validating -> Validated | Unknown, from retrieval evidence for the
    /// claim. A retrieval failure is Unknown.
    pub async fn validate_identity(&mut self, claim: &IdentityClaim) -> AgentResult<ConversationState> {
        self.validate_candidates(std::slice::from_ref(claim)).await
    }

    /// One identity attempt over alternative readings of the same
    /// introduction. All candidates share one lookup since they are made of
    /// the same words; the first that matches the evidence wins.
    async fn validate_candidates(&mut self, candidates: &[IdentityClaim]) -> AgentResult<ConversationState> {
        self.transition(ConversationState::Validating)?;
        self.identity_attempts += 1;

        let Some(first) = candidates.first() else {
            self.transition(ConversationState::Unknown)?;
            return Ok(ConversationState::Unknown);
        };
        let query = format!("{} {}", first.name, first.company);
        let result = self.evidence.search(&query, None).await;
        if let Some(failure) = &result.failure {
            warn!(
                kind = %failure.kind,
                detail = %failure.detail,
                "Identity lookup failed; caller stays unvalidated"
            );
            self.transition(ConversationState::Unknown)?;
            return Ok(ConversationState::Unknown);
        }

        let matched = candidates
            .iter()
            .find_map(|claim| match_identity(claim, &result.hits));
        match matched {
            Some(caller) => {
                info!(
                    client_id = %caller.client_id,
                    company_id = %caller.company.id,
                    "Caller validated"
                );
                self.caller = Some(caller);
                self.transition(ConversationState::Validated)?;
                Ok(ConversationState::Validated)
            }
            None => {
                info!(
                    attempt = self.identity_attempts,
                    max = self.max_identity_attempts,
                    "Caller identity not confirmed"
                );
                self.transition(ConversationState::Unknown)?;
                Ok(ConversationState::Unknown)
            }
        }
    }

    async fn on_issue(&mut self, utterance: &str) -> AgentResult<AgentReply> {
        let company = self.caller.as_ref().map(|c| c.company.name.clone());
        if self.scope.is_off_topic(utterance, company.as_deref()) {
            debug!(state = %self.state, "Refused off-topic utterance");
            return Ok(self.reply(phrases::OFF_TOPIC));
        }
        if utterance.trim().is_empty() {
            return Ok(self.reply(phrases::ASK_ISSUE_AGAIN));
        }

        let result = self.evidence.search(utterance, None).await;
        if let Some(failure) = &result.failure {
            warn!(
                kind = %failure.kind,
                detail = %failure.detail,
                "Issue lookup failed"
            );
            return Ok(self.reply(phrases::SERVICE_UNAVAILABLE));
        }

        let text = match match_protocol(utterance, &result.hits) {
            Some(protocol) => {
                info!(protocol_id = %protocol.id, "Resolving via protocol");
                self.transition(ConversationState::ResolvingViaProtocol)?;
                self.resolution = Some(ResolutionKind::Verified);
                phrases::protocol_solution(protocol)
            }
            None => {
                info!(hits = result.hits.len(), "No matching protocol; resolving via generated answer");
                self.transition(ConversationState::ResolvingViaGenerated)?;
                self.resolution = Some(ResolutionKind::Generated);
                phrases::generated_solution(&self.generated_suggestion(utterance, &result))
            }
        };
        self.transition(ConversationState::AwaitingConfirmation)?;
        Ok(self.reply(text))
    }

    /// What the generated path may say. Only an answer written by a
    /// generative synthesizer is read out; extractive summaries describe the
    /// evidence (other companies, client registrations) and are never
    /// spoken. Without one, related services of the caller's own company
    /// give a hint, and otherwise the generic suggestion is used.
    fn generated_suggestion(&self, issue: &str, result: &SearchResult) -> String {
        let answer = result.answer.trim();
        if result.generative && !answer.is_empty() && answer != NO_EVIDENCE_ANSWER {
            return answer.to_string();
        }
        let Some(caller) = &self.caller else {
            return String::new();
        };
        let services = related_services(issue, &caller.company.id, &result.hits);
        if services.is_empty() {
            String::new()
        } else {
            phrases::service_hint(&services)
        }
    }

    fn on_confirmation(&mut self, utterance: &str) -> AgentResult<AgentReply> {
        let company = self.caller.as_ref().map(|c| c.company.name.clone());
        match parse_confirmation(utterance) {
            Some(Confirmation::Accept) => {
                self.transition(ConversationState::Resolved)?;
                let text = match self.resolution {
                    Some(ResolutionKind::Generated) => phrases::RESOLVED_GENERATED,
                    _ => phrases::RESOLVED_VERIFIED,
                };
                Ok(self.reply(text))
            }
            Some(Confirmation::Reject) => {
                self.transition(ConversationState::Escalated)?;
                Ok(self.reply(phrases::escalation()))
            }
            None if self.scope.is_off_topic(utterance, company.as_deref()) => {
                Ok(self.reply(phrases::OFF_TOPIC))
            }
            None => Ok(self.reply(phrases::CONFIRMATION_UNCLEAR)),
        }
    }
}
