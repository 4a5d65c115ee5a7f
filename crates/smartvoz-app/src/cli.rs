//! CLI argument definitions for the `smartvoz` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SmartVoz - voice support agent over a company knowledge base.
#[derive(Parser, Debug)]
#[command(name = "smartvoz", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the knowledge base, corpus, index and transcripts.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export companies, clients, services and protocols to the corpus.
    Export,
    /// Embed the current corpus into a fresh index.
    BuildIndex,
    /// Export and build in one locked run; prints a JSON report.
    Rebuild,
    /// Run a retrieval query and print what the agent would see.
    Query {
        /// Query text.
        #[arg(required = true)]
        text: Vec<String>,
        /// Number of documents to retrieve.
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<i64>,
    },
    /// Hold a call on the console: type as the caller, empty line or EOF hangs up.
    Call {
        /// Room name recorded with the transcript.
        #[arg(short = 'r', long = "room", default_value = "console")]
        room: String,
    },
    /// Write a default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Fill an empty knowledge base with demo companies, clients and protocols.
    SeedDemo,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SMARTVOZ_CONFIG env var > ~/.smartvoz/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SMARTVOZ_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// `--data-dir` override, if given.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".smartvoz").join("config.toml");
    }
    PathBuf::from("config.toml")
}
