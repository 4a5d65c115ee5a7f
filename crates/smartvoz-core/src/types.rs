use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Knowledge-base entities
// =============================================================================

/// Inline reference to a company, embedded in client and service records so
/// that a single document is enough to relate a person to an enterprise.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyRef {
    pub id: String,
    pub name: String,
}

/// An enterprise served by the call center.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    #[serde(rename = "company_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub address: String,
}

impl Company {
    pub fn as_ref(&self) -> CompanyRef {
        CompanyRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// A registered caller, associated with one or more companies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    #[serde(rename = "client_id")]
    pub id: String,
    pub name: String,
    pub companies: Vec<CompanyRef>,
    #[serde(default)]
    pub national_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

/// A service a company offers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub company: CompanyRef,
}

/// The issue category that triggers a protocol.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: String,
}

/// One ordered step of a protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStep {
    pub code: u32,
    pub text: String,
}

/// A documented resolution procedure for a known issue category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub id: String,
    pub name: String,
    pub description: String,
    pub reason: Option<Reason>,
    /// Ordered ascending by step code.
    pub steps: Vec<ProtocolStep>,
    pub resolution_options: Vec<String>,
    pub notes: String,
}

impl Protocol {
    /// Sort steps ascending by their code. Ties keep their input order.
    pub fn sort_steps(&mut self) {
        self.steps.sort_by_key(|s| s.code);
    }
}

// =============================================================================
// Documents
// =============================================================================

/// Kind of an exported document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Company,
    Client,
    ClientGroup,
    ServiceGroup,
    Protocol,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Company => "company",
            DocumentKind::Client => "client",
            DocumentKind::ClientGroup => "client_group",
            DocumentKind::ServiceGroup => "service_group",
            DocumentKind::Protocol => "protocol",
        }
    }

    /// File-name prefix in the corpus directory.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            DocumentKind::Company => "company",
            DocumentKind::Client => "client",
            DocumentKind::ClientGroup => "clients_company",
            DocumentKind::ServiceGroup => "services_company",
            DocumentKind::Protocol => "protocol",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Protocol => "md",
            _ => "json",
        }
    }

    /// True for documents that carry client identities.
    pub fn is_client(&self) -> bool {
        matches!(self, DocumentKind::Client | DocumentKind::ClientGroup)
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service entry inside a per-company service document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub service_id: String,
    pub name: String,
    pub description: String,
}

/// All clients of one company, used when the client count is too large for
/// one document per client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientGroup {
    pub company: CompanyRef,
    pub clients: Vec<Client>,
}

/// All services of one company.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGroup {
    pub company: CompanyRef,
    pub services: Vec<ServiceSummary>,
}

/// A self-contained, retrievable corpus unit.
///
/// JSON documents carry the variant as a `"type"` tag. Protocol documents
/// are written as structured markdown instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Document {
    Company(Company),
    Client(Client),
    ClientGroup(ClientGroup),
    ServiceGroup(ServiceGroup),
    Protocol(Protocol),
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Company(_) => DocumentKind::Company,
            Document::Client(_) => DocumentKind::Client,
            Document::ClientGroup(_) => DocumentKind::ClientGroup,
            Document::ServiceGroup(_) => DocumentKind::ServiceGroup,
            Document::Protocol(_) => DocumentKind::Protocol,
        }
    }

    /// The id the file name is keyed on.
    pub fn key(&self) -> &str {
        match self {
            Document::Company(c) => &c.id,
            Document::Client(c) => &c.id,
            Document::ClientGroup(g) => &g.company.id,
            Document::ServiceGroup(g) => &g.company.id,
            Document::Protocol(p) => &p.id,
        }
    }

    /// Stable document id, e.g. `client_42`.
    pub fn doc_id(&self) -> String {
        format!("{}_{}", self.kind().file_prefix(), sanitize_key(self.key()))
    }

    /// Deterministic corpus file name: `{type}_{id}.{json|md}`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.doc_id(), self.kind().extension())
    }
}

/// Keep ids file-system safe: anything outside `[A-Za-z0-9_-]` becomes `-`.
pub fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

// =============================================================================
// Call records
// =============================================================================

/// How a call session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Resolved,
    Escalated,
    /// Identity could not be validated within the allowed attempts.
    Unverified,
    /// The caller hung up before a terminal state.
    Disconnected,
    /// The session was torn down without an orderly finish.
    Aborted,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Resolved => "resolved",
            CallOutcome::Escalated => "escalated",
            CallOutcome::Unverified => "unverified",
            CallOutcome::Disconnected => "disconnected",
            CallOutcome::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resolved" => Some(CallOutcome::Resolved),
            "escalated" => Some(CallOutcome::Escalated),
            "unverified" => Some(CallOutcome::Unverified),
            "disconnected" => Some(CallOutcome::Disconnected),
            "aborted" => Some(CallOutcome::Aborted),
            _ => None,
        }
    }
}

/// One insert-only row linking a call to its stored transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub session_id: Uuid,
    pub room_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub transcript_path: String,
    pub outcome: CallOutcome,
}

// =============================================================================
// Transcripts
// =============================================================================

/// A caller whose name and company were confirmed against the corpus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedCaller {
    pub client_id: String,
    pub name: String,
    pub company: CompanyRef,
}

/// Where the presented solution came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Synthesized from a matched protocol.
    Verified,
    /// Generated without a matching protocol and disclosed as unverified.
    Generated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    Caller,
}

/// One utterance in a call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
    /// Dialogue state after the turn.
    pub state: String,
}

/// The full, immutable record of a finished call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: Uuid,
    pub room_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: CallOutcome,
    pub final_state: String,
    pub caller: Option<VerifiedCaller>,
    pub resolution: Option<ResolutionKind>,
    pub turns: Vec<Turn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publicarte() -> CompanyRef {
        CompanyRef {
            id: "7".to_string(),
            name: "Publicarte".to_string(),
        }
    }

    #[test]
    fn test_document_file_names() {
        let company = Document::Company(Company {
            id: "7".to_string(),
            name: "Publicarte".to_string(),
            ..Default::default()
        });
        assert_eq!(company.file_name(), "company_7.json");

        let group = Document::ClientGroup(ClientGroup {
            company: publicarte(),
            clients: vec![],
        });
        assert_eq!(group.file_name(), "clients_company_7.json");

        let services = Document::ServiceGroup(ServiceGroup {
            company: publicarte(),
            services: vec![],
        });
        assert_eq!(services.file_name(), "services_company_7.json");

        let protocol = Document::Protocol(Protocol {
            id: "3".to_string(),
            ..Default::default()
        });
        assert_eq!(protocol.file_name(), "protocol_3.md");
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("42"), "42");
        assert_eq!(sanitize_key("a/b c"), "a-b-c");
        assert_eq!(sanitize_key("  "), "unknown");
    }

    #[test]
    fn test_client_json_uses_type_tag_and_field_names() {
        let doc = Document::Client(Client {
            id: "12".to_string(),
            name: "Jorge Urioste".to_string(),
            companies: vec![publicarte()],
            ..Default::default()
        });
        let json: serde_json::Value = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], "client");
        assert_eq!(json["client_id"], "12");
        assert_eq!(json["companies"][0]["name"], "Publicarte");
    }

    #[test]
    fn test_protocol_sort_steps() {
        let mut p = Protocol {
            steps: vec![
                ProtocolStep { code: 3, text: "c".into() },
                ProtocolStep { code: 1, text: "a".into() },
                ProtocolStep { code: 2, text: "b".into() },
            ],
            ..Default::default()
        };
        p.sort_steps();
        let codes: Vec<u32> = p.steps.iter().map(|s| s.code).collect();
        assert_eq!(codes, vec![1, 2, 3]);
    }

    #[test]
    fn test_call_outcome_parse() {
        for outcome in [
            CallOutcome::Resolved,
            CallOutcome::Escalated,
            CallOutcome::Unverified,
            CallOutcome::Disconnected,
            CallOutcome::Aborted,
        ] {
            assert_eq!(CallOutcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(CallOutcome::parse("nope"), None);
    }
}
