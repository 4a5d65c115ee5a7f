//! Transcript hand-off: one JSON blob per call plus one call-record row.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use smartvoz_core::config::SmartvozConfig;
use smartvoz_core::fsutil::atomic_write;
use smartvoz_core::types::{sanitize_key, CallRecord, Transcript};
use smartvoz_storage::{CallRecordRepository, Database};

use crate::error::{AgentError, AgentResult};

/// Where a transcript ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub path: PathBuf,
    /// Row id in `call_records`, when a repository is attached.
    pub row_id: Option<i64>,
}

/// Receives each finished call's transcript exactly once.
///
/// Called from `Drop` on abnormal termination, so implementations are
/// synchronous.
pub trait TranscriptRecorder: Send + Sync {
    fn record(&self, transcript: &Transcript) -> AgentResult<RecordedCall>;
}

/// Writes `call_<session>_<timestamp>_<room>.json` into a directory and,
/// optionally, the matching insert-only call record.
pub struct FileTranscriptRecorder {
    dir: PathBuf,
    calls: Option<CallRecordRepository>,
}

impl FileTranscriptRecorder {
    pub fn new(dir: impl Into<PathBuf>, calls: Option<CallRecordRepository>) -> Self {
        Self {
            dir: dir.into(),
            calls,
        }
    }

    /// Transcript directory and database from configuration.
    pub fn from_config(config: &SmartvozConfig) -> AgentResult<Self> {
        let db = Database::new(&config.database_path())?;
        Ok(Self::new(
            config.transcript_dir(),
            Some(CallRecordRepository::new(Arc::new(db))),
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(transcript: &Transcript) -> String {
        format!(
            "call_{}_{}_{}.json",
            transcript.session_id,
            transcript.started_at.format("%Y%m%dT%H%M%SZ"),
            sanitize_key(&transcript.room_name)
        )
    }
}

impl TranscriptRecorder for FileTranscriptRecorder {
    fn record(&self, transcript: &Transcript) -> AgentResult<RecordedCall> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| AgentError::Recorder(format!("{}: {}", self.dir.display(), e)))?;
        let path = self.dir.join(Self::file_name(transcript));
        if path.exists() {
            return Err(AgentError::AlreadyRecorded(transcript.session_id));
        }

        let json = serde_json::to_vec_pretty(transcript)
            .map_err(|e| AgentError::Recorder(e.to_string()))?;
        atomic_write(&path, &json)?;
        info!(
            session_id = %transcript.session_id,
            path = %path.display(),
            turns = transcript.turns.len(),
            "Transcript written"
        );

        let row_id = match &self.calls {
            Some(calls) => {
                let record = CallRecord {
                    session_id: transcript.session_id,
                    room_name: transcript.room_name.clone(),
                    started_at: transcript.started_at,
                    ended_at: transcript.ended_at,
                    transcript_path: path.display().to_string(),
                    outcome: transcript.outcome,
                };
                match calls.insert(&record) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        // The blob is already on disk; report, keep it.
                        warn!(
                            session_id = %transcript.session_id,
                            "Call record insert failed: {}", e
                        );
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        Ok(RecordedCall { path, row_id })
    }
}
