//! SmartVoz Agent crate - the per-call dialogue policy.
//!
//! A [`ConversationValidator`] interprets retrieval evidence into identity
//! and resolution decisions. A [`CallSession`] owns one validator plus the
//! turn history and guarantees the transcript is handed to a
//! [`TranscriptRecorder`] exactly once, however the call ends.

pub mod error;
pub mod parser;
pub mod phrases;
pub mod recorder;
pub mod scope;
pub mod session;
pub mod state;
pub mod validator;

pub use error::{AgentError, AgentResult};
pub use parser::{
    identity_candidates, parse_confirmation, parse_identity, Confirmation, IdentityClaim,
};
pub use recorder::{FileTranscriptRecorder, RecordedCall, TranscriptRecorder};
pub use scope::ScopeGuard;
pub use session::{run_call, CallChannel, CallSession};
pub use state::ConversationState;
pub use validator::{
    match_identity, match_protocol, AgentReply, ConversationValidator, EvidenceSource,
};
