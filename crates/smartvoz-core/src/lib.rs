//! SmartVoz core crate - configuration, error taxonomy, and domain types
//! shared by the exporter, index, retrieval and conversation crates.

pub mod config;
pub mod error;
pub mod fsutil;
pub mod text;
pub mod types;

pub use config::SmartvozConfig;
pub use error::{Result, SmartvozError};
pub use types::*;
