//! Call session: one validator, the turn log, and the transcript hand-off.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use smartvoz_core::types::{CallOutcome, Speaker, Transcript, Turn};

use crate::error::{AgentError, AgentResult};
use crate::phrases;
use crate::recorder::{RecordedCall, TranscriptRecorder};
use crate::state::ConversationState;
use crate::validator::{AgentReply, ConversationValidator};

/// The transport carrying one call's text, e.g. a speech-to-text and
/// text-to-speech pipeline or a console.
#[async_trait]
pub trait CallChannel: Send {
    async fn send(&mut self, text: &str) -> AgentResult<()>;

    /// Next caller utterance, or `None` when the caller hung up.
    async fn receive(&mut self) -> AgentResult<Option<String>>;
}

/// A single call.
///
/// The transcript is handed to the recorder exactly once: by [`finish`],
/// or on drop with an `aborted` outcome when the call ended any other way.
///
/// [`finish`]: CallSession::finish
pub struct CallSession {
    id: Uuid,
    room_name: String,
    started_at: DateTime<Utc>,
    validator: ConversationValidator,
    turns: Vec<Turn>,
    recorder: Arc<dyn TranscriptRecorder>,
    handed_off: bool,
}

impl CallSession {
    pub fn new(
        room_name: impl Into<String>,
        validator: ConversationValidator,
        recorder: Arc<dyn TranscriptRecorder>,
    ) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            room_name: room_name.into(),
            started_at: Utc::now(),
            validator,
            turns: Vec::new(),
            recorder,
            handed_off: false,
        };
        info!(session_id = %session.id, room = %session.room_name, "Call started");
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConversationState {
        self.validator.state()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn validator(&self) -> &ConversationValidator {
        &self.validator
    }

    /// The agent speaks first.
    pub fn greet(&mut self) -> String {
        let text = self.validator.greeting();
        self.push_turn(Speaker::Agent, &text);
        text
    }

    /// Record the caller's utterance, run the dialogue policy, and record
    /// the agent's reply.
    pub async fn respond(&mut self, utterance: &str) -> AgentResult<AgentReply> {
        self.push_turn(Speaker::Caller, utterance);
        let reply = match self.validator.handle(utterance).await {
            Ok(reply) => reply,
            Err(AgentError::ConversationClosed(state)) => AgentReply {
                text: phrases::CALL_ENDED.to_string(),
                state,
                end_call: true,
            },
            Err(e) => return Err(e),
        };
        self.push_turn(Speaker::Agent, &reply.text);
        Ok(reply)
    }

    /// Resolved, escalated, or out of identity attempts.
    pub fn is_finished(&self) -> bool {
        self.validator.state().is_terminal() || self.validator.is_exhausted()
    }

    fn push_turn(&mut self, speaker: Speaker, text: &str) {
        self.turns.push(Turn {
            speaker,
            text: text.to_string(),
            at: Utc::now(),
            state: self.validator.state().to_string(),
        });
    }

    /// Outcome for a call that ended through the normal path.
    fn outcome(&self) -> CallOutcome {
        match self.validator.state() {
            ConversationState::Resolved => CallOutcome::Resolved,
            ConversationState::Escalated => CallOutcome::Escalated,
            _ if self.validator.is_exhausted() => CallOutcome::Unverified,
            _ => CallOutcome::Disconnected,
        }
    }

    /// End the call and hand the transcript to the recorder.
    pub fn finish(mut self) -> AgentResult<RecordedCall> {
        let outcome = self.outcome();
        self.hand_off(outcome)
    }

    fn hand_off(&mut self, outcome: CallOutcome) -> AgentResult<RecordedCall> {
        if self.handed_off {
            return Err(AgentError::AlreadyRecorded(self.id));
        }
        // Set first: a failed hand-off is not retried from Drop.
        self.handed_off = true;

        let transcript = Transcript {
            session_id: self.id,
            room_name: self.room_name.clone(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            outcome,
            final_state: self.validator.state().to_string(),
            caller: self.validator.caller().cloned(),
            resolution: self.validator.resolution(),
            turns: std::mem::take(&mut self.turns),
        };
        let recorded = self.recorder.record(&transcript)?;
        info!(
            session_id = %self.id,
            outcome = outcome.as_str(),
            final_state = %transcript.final_state,
            "Call ended"
        );
        Ok(recorded)
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        if self.handed_off {
            return;
        }
        let outcome = match self.validator.state() {
            ConversationState::Resolved => CallOutcome::Resolved,
            ConversationState::Escalated => CallOutcome::Escalated,
            _ => CallOutcome::Aborted,
        };
        if let Err(e) = self.hand_off(outcome) {
            error!(session_id = %self.id, "Transcript hand-off failed: {}", e);
        }
    }
}

/// Drive a call over `channel` until the dialogue ends or the caller hangs
/// up, then record it.
///
/// A channel error ends the call early; the session is dropped and its
/// transcript recorded as aborted.
pub async fn run_call<C>(mut session: CallSession, channel: &mut C) -> AgentResult<RecordedCall>
where
    C: CallChannel + ?Sized,
{
    let greeting = session.greet();
    channel.send(&greeting).await?;

    while let Some(utterance) = channel.receive().await? {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            continue;
        }
        let reply = session.respond(utterance).await?;
        channel.send(&reply.text).await?;
        if reply.end_call {
            break;
        }
    }

    session.finish()
}
