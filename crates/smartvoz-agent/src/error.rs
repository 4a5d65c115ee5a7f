//! Error types for the dialogue layer.

use smartvoz_core::error::SmartvozError;
use uuid::Uuid;

use crate::state::ConversationState;

/// Errors from the conversation validator, call session and recorder.
///
/// Retrieval problems never show up here; they are handled inside the
/// dialogue as "service unavailable" branches.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConversationState,
        to: ConversationState,
    },
    #[error("conversation already ended in state {0}")]
    ConversationClosed(ConversationState),
    #[error("transcript for session {0} was already handed off")]
    AlreadyRecorded(Uuid),
    #[error("channel error: {0}")]
    Channel(String),
    #[error("recorder error: {0}")]
    Recorder(String),
}

impl From<SmartvozError> for AgentError {
    fn from(err: SmartvozError) -> Self {
        AgentError::Recorder(err.to_string())
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
