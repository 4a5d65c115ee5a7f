//! Database schema migrations.
//!
//! Version 1 creates the knowledge-base tables the exporter reads. Version 2
//! adds the insert-only `call_records` table written by the transcript
//! recorder.

use rusqlite::Connection;
use tracing::info;

use smartvoz_core::error::SmartvozError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), SmartvozError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| SmartvozError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| SmartvozError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: knowledge_base");
    }
    if current_version < 2 {
        apply_v2(conn)?;
        info!("Applied migration v2: call_records");
    }

    Ok(())
}

/// Version 1: knowledge base.
fn apply_v1(conn: &Connection) -> Result<(), SmartvozError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS companies (
            company_id  TEXT PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            phone       TEXT NOT NULL DEFAULT '',
            email       TEXT NOT NULL DEFAULT '',
            city        TEXT NOT NULL DEFAULT '',
            address     TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS clients (
            client_id   TEXT PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            national_id TEXT NOT NULL DEFAULT '',
            email       TEXT NOT NULL DEFAULT '',
            phone       TEXT NOT NULL DEFAULT '',
            address     TEXT NOT NULL DEFAULT ''
        );

        -- A client may belong to several companies.
        CREATE TABLE IF NOT EXISTS client_companies (
            client_id   TEXT NOT NULL REFERENCES clients(client_id) ON DELETE CASCADE,
            company_id  TEXT NOT NULL REFERENCES companies(company_id) ON DELETE CASCADE,
            PRIMARY KEY (client_id, company_id)
        );

        CREATE INDEX IF NOT EXISTS idx_client_companies_company
            ON client_companies (company_id);

        CREATE TABLE IF NOT EXISTS services (
            service_id  TEXT PRIMARY KEY NOT NULL,
            company_id  TEXT NOT NULL REFERENCES companies(company_id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_services_company
            ON services (company_id);

        CREATE TABLE IF NOT EXISTS reasons (
            reason_id   TEXT PRIMARY KEY NOT NULL,
            code        TEXT NOT NULL DEFAULT '',
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS protocols (
            protocol_id         TEXT PRIMARY KEY NOT NULL,
            name                TEXT NOT NULL,
            description         TEXT NOT NULL DEFAULT '',
            reason_id           TEXT REFERENCES reasons(reason_id) ON DELETE SET NULL,
            resolution_options  TEXT NOT NULL DEFAULT '[]',
            notes               TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS protocol_steps (
            protocol_id TEXT NOT NULL REFERENCES protocols(protocol_id) ON DELETE CASCADE,
            step_code   INTEGER NOT NULL,
            text        TEXT NOT NULL,
            PRIMARY KEY (protocol_id, step_code)
        );

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'knowledge_base');
        ",
    )
    .map_err(|e| SmartvozError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

/// Version 2: call records, guarded against UPDATE and DELETE.
fn apply_v2(conn: &Connection) -> Result<(), SmartvozError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS call_records (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id      TEXT NOT NULL UNIQUE,
            room_name       TEXT NOT NULL,
            started_at      INTEGER NOT NULL,
            ended_at        INTEGER NOT NULL,
            transcript_path TEXT NOT NULL,
            outcome         TEXT NOT NULL
                            CHECK (outcome IN ('resolved', 'escalated', 'unverified', 'disconnected', 'aborted')),
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_call_records_started
            ON call_records (started_at DESC);

        CREATE TRIGGER IF NOT EXISTS call_records_no_update
            BEFORE UPDATE ON call_records
        BEGIN
            SELECT RAISE(ABORT, 'call_records is insert-only');
        END;

        CREATE TRIGGER IF NOT EXISTS call_records_no_delete
            BEFORE DELETE ON call_records
        BEGIN
            SELECT RAISE(ABORT, 'call_records is insert-only');
        END;

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (2, 'call_records');
        ",
    )
    .map_err(|e| SmartvozError::Storage(format!("Failed to apply migration v2: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_client_company_link_requires_company() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO clients (client_id, name) VALUES ('c1', 'Jorge Urioste')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO client_companies (client_id, company_id) VALUES ('c1', 'missing')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_call_records_reject_update_and_delete() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO call_records (session_id, room_name, started_at, ended_at, transcript_path, outcome)
             VALUES ('s1', 'room-1', 1700000000000, 1700000060000, '/tmp/t.json', 'resolved')",
            [],
        )
        .unwrap();

        let update = conn.execute(
            "UPDATE call_records SET outcome = 'escalated' WHERE session_id = 's1'",
            [],
        );
        assert!(update.is_err());

        let delete = conn.execute("DELETE FROM call_records", []);
        assert!(delete.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM call_records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_call_records_outcome_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO call_records (session_id, room_name, started_at, ended_at, transcript_path, outcome)
             VALUES ('s2', 'room-2', 1, 2, '/tmp/t.json', 'bogus')",
            [],
        );
        assert!(result.is_err());
    }
}
