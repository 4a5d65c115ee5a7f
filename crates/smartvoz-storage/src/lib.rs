//! SmartVoz Storage crate - SQLite knowledge base and call records.
//!
//! Provides a WAL-mode SQLite database with migrations, the
//! [`KnowledgeSource`] the exporter reads companies, clients, services and
//! protocols from, and the insert-only call-record repository.

pub mod calls;
pub mod db;
pub mod demo;
pub mod knowledge;
pub mod migrations;

pub use calls::CallRecordRepository;
pub use db::Database;
pub use demo::{seed_demo, SeedSummary};
pub use knowledge::{KnowledgeSource, SqliteKnowledgeSource};
