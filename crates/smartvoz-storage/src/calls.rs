//! Insert-only persistence of call records.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use tracing::info;
use uuid::Uuid;

use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::types::{CallOutcome, CallRecord};

use crate::db::Database;

/// Repository for call records.
///
/// Rows are only ever inserted. The schema rejects UPDATE and DELETE, and a
/// second insert for the same session id fails.
pub struct CallRecordRepository {
    db: Arc<Database>,
}

impl CallRecordRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a call record, returning its row id.
    pub fn insert(&self, record: &CallRecord) -> Result<i64> {
        let row_id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO call_records (session_id, room_name, started_at, ended_at, transcript_path, outcome)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    record.session_id.to_string(),
                    record.room_name,
                    record.started_at.timestamp_millis(),
                    record.ended_at.timestamp_millis(),
                    record.transcript_path,
                    record.outcome.as_str(),
                ],
            )
            .map_err(|e| SmartvozError::Storage(format!("Failed to insert call record: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })?;
        info!(
            session_id = %record.session_id,
            room = %record.room_name,
            outcome = record.outcome.as_str(),
            "Call record stored"
        );
        Ok(row_id)
    }

    pub fn find_by_session(&self, session_id: Uuid) -> Result<Option<CallRecord>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, room_name, started_at, ended_at, transcript_path, outcome
                     FROM call_records WHERE session_id = ?1",
                )
                .map_err(|e| SmartvozError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![session_id.to_string()], |row| {
                    Ok(row_to_call_record(row))
                })
                .optional()
                .map_err(|e| SmartvozError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// Most recent calls first.
    pub fn list_recent(&self, limit: u32) -> Result<Vec<CallRecord>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, room_name, started_at, ended_at, transcript_path, outcome
                     FROM call_records
                     ORDER BY started_at DESC
                     LIMIT ?1",
                )
                .map_err(|e| SmartvozError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![limit], |row| Ok(row_to_call_record(row)))
                .map_err(|e| SmartvozError::Storage(e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let record = row.map_err(|e| SmartvozError::Storage(e.to_string()))??;
                records.push(record);
            }
            Ok(records)
        })
    }
}

fn row_to_call_record(row: &rusqlite::Row<'_>) -> Result<CallRecord> {
    let storage = |e: rusqlite::Error| SmartvozError::Storage(e.to_string());

    let session_id: String = row.get(0).map_err(storage)?;
    let outcome: String = row.get(5).map_err(storage)?;

    Ok(CallRecord {
        session_id: Uuid::parse_str(&session_id)
            .map_err(|e| SmartvozError::Storage(format!("Invalid session id: {}", e)))?,
        room_name: row.get(1).map_err(storage)?,
        started_at: millis_to_datetime(row.get(2).map_err(storage)?)?,
        ended_at: millis_to_datetime(row.get(3).map_err(storage)?)?,
        transcript_path: row.get(4).map_err(storage)?,
        outcome: CallOutcome::parse(&outcome)
            .ok_or_else(|| SmartvozError::Storage(format!("Unknown call outcome: {}", outcome)))?,
    })
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| SmartvozError::Storage(format!("Invalid timestamp: {}", ms)))
}
