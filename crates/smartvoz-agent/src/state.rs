//! Conversation state machine.
//!
//! - AwaitingIdentity -> Validating (name and company heard)
//! - Validating -> Validated | Unknown
//! - Unknown -> Validating (another identity attempt)
//! - Validated -> AwaitingIssue
//! - AwaitingIssue -> ResolvingViaProtocol | ResolvingViaGenerated
//! - ResolvingVia* -> AwaitingConfirmation
//! - AwaitingConfirmation -> Resolved | Escalated

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConversationState {
    AwaitingIdentity,
    Validating,
    Validated,
    /// Identity could not be confirmed. Only identity collection continues.
    Unknown,
    AwaitingIssue,
    ResolvingViaProtocol,
    ResolvingViaGenerated,
    AwaitingConfirmation,
    Resolved,
    Escalated,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversationState::AwaitingIdentity => "AwaitingIdentity",
            ConversationState::Validating => "Validating",
            ConversationState::Validated => "Validated",
            ConversationState::Unknown => "Unknown",
            ConversationState::AwaitingIssue => "AwaitingIssue",
            ConversationState::ResolvingViaProtocol => "ResolvingViaProtocol",
            ConversationState::ResolvingViaGenerated => "ResolvingViaGenerated",
            ConversationState::AwaitingConfirmation => "AwaitingConfirmation",
            ConversationState::Resolved => "Resolved",
            ConversationState::Escalated => "Escalated",
        };
        f.write_str(name)
    }
}

impl ConversationState {
    pub fn can_transition_to(&self, target: &ConversationState) -> bool {
        use ConversationState::*;
        matches!(
            (self, target),
            (AwaitingIdentity, Validating)
                | (Validating, Validated)
                | (Validating, Unknown)
                | (Unknown, Validating)
                | (Validated, AwaitingIssue)
                | (AwaitingIssue, ResolvingViaProtocol)
                | (AwaitingIssue, ResolvingViaGenerated)
                | (ResolvingViaProtocol, AwaitingConfirmation)
                | (ResolvingViaGenerated, AwaitingConfirmation)
                | (AwaitingConfirmation, Resolved)
                | (AwaitingConfirmation, Escalated)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationState::Resolved | ConversationState::Escalated)
    }

    /// True once identity has been confirmed.
    pub fn is_validated(&self) -> bool {
        use ConversationState::*;
        matches!(
            self,
            Validated
                | AwaitingIssue
                | ResolvingViaProtocol
                | ResolvingViaGenerated
                | AwaitingConfirmation
                | Resolved
                | Escalated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConversationState::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            AwaitingIdentity,
            Validating,
            Validated,
            AwaitingIssue,
            ResolvingViaProtocol,
            AwaitingConfirmation,
            Resolved,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_unknown_never_reaches_issue_states() {
        for target in [AwaitingIssue, ResolvingViaProtocol, ResolvingViaGenerated, Validated] {
            assert!(!Unknown.can_transition_to(&target));
        }
        assert!(Unknown.can_transition_to(&Validating));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!AwaitingIdentity.can_transition_to(&Validated));
        assert!(!AwaitingIssue.can_transition_to(&AwaitingConfirmation));
        assert!(!Resolved.can_transition_to(&AwaitingIssue));
        assert!(!Escalated.can_transition_to(&Resolved));
    }

    #[test]
    fn test_terminal_and_validated() {
        assert!(Resolved.is_terminal());
        assert!(Escalated.is_terminal());
        assert!(!Unknown.is_terminal());
        assert!(AwaitingIssue.is_validated());
        assert!(!Unknown.is_validated());
        assert!(!Validating.is_validated());
    }

    #[test]
    fn test_display() {
        assert_eq!(ResolvingViaGenerated.to_string(), "ResolvingViaGenerated");
    }
}
