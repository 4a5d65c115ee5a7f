//! SmartVoz application binary - composition root.
//!
//! 1. Load `.env.local`, configuration and credentials (once)
//! 2. Install the tracing subscriber
//! 3. Dispatch the subcommand: export, index, rebuild, query, or a console call

mod cli;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};

use smartvoz_agent::{
    run_call, AgentError, AgentResult, CallChannel, CallSession, ConversationValidator,
    FileTranscriptRecorder, TranscriptRecorder,
};
use smartvoz_core::config::SmartvozConfig;
use smartvoz_core::error::SmartvozError;
use smartvoz_storage::{seed_demo, Database, SqliteKnowledgeSource};
use smartvoz_vector::{build_index, export_corpus, rebuild, RetrievalGateway};

use cli::{CliArgs, Command};

/// Caller on stdin, agent on stdout. An empty line or EOF hangs up.
struct ConsoleChannel {
    lines: Lines<BufReader<Stdin>>,
    out: Stdout,
}

impl ConsoleChannel {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            out: tokio::io::stdout(),
        }
    }
}

#[async_trait]
impl CallChannel for ConsoleChannel {
    async fn send(&mut self, text: &str) -> AgentResult<()> {
        let line = format!("agente> {}\nusted> ", text);
        self.out
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AgentError::Channel(e.to_string()))?;
        self.out
            .flush()
            .await
            .map_err(|e| AgentError::Channel(e.to_string()))
    }

    async fn receive(&mut self) -> AgentResult<Option<String>> {
        let line = self
            .lines
            .next_line()
            .await
            .map_err(|e| AgentError::Channel(e.to_string()))?;
        Ok(line.filter(|l| !l.trim().is_empty()))
    }
}

fn open_knowledge_base(config: &SmartvozConfig) -> Result<SqliteKnowledgeSource, SmartvozError> {
    let db = Database::new(&config.database_path())?;
    Ok(SqliteKnowledgeSource::new(Arc::new(db)))
}

fn init_config(path: &Path, data_dir: Option<String>, force: bool) -> Result<(), SmartvozError> {
    if path.exists() && !force {
        return Err(SmartvozError::Configuration(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    let mut config = SmartvozConfig::default();
    if let Some(dir) = data_dir {
        config.general.data_dir = dir;
    }
    config.save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Local overrides first; dotenvy never replaces variables already set.
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let mut config = SmartvozConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }
    config.resolve_secrets(|name| std::env::var(name).ok());

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::debug!(path = %config_file.display(), "Configuration resolved");

    match args.command {
        Command::InitConfig { force } => {
            init_config(&config_file, args.resolve_data_dir(), force)?;
        }
        Command::SeedDemo => {
            let source = open_knowledge_base(&config)?;
            let summary = seed_demo(&source)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Export => {
            let source = open_knowledge_base(&config)?;
            let report = export_corpus(&config, &source)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_complete() {
                std::process::exit(2);
            }
        }
        Command::BuildIndex => {
            let report = build_index(&config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Rebuild => {
            let source = open_knowledge_base(&config)?;
            let report = rebuild(&config, &source).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Command::Query { text, top_k } => {
            let gateway = RetrievalGateway::from_config(&config)?;
            let result = gateway.search(&text.join(" "), top_k).await;
            println!("{}", result.to_text());
            if !result.is_failure() {
                let manifest = gateway.stats().await?;
                println!(
                    "\nINDEX: {} documents, provider={} model={} dims={} built {}",
                    manifest.document_count,
                    manifest.provider,
                    manifest.model,
                    manifest.dimensions,
                    manifest.created_at.to_rfc3339()
                );
            }
        }
        Command::Call { room } => {
            let gateway = Arc::new(RetrievalGateway::from_config(&config)?);
            let recorder: Arc<dyn TranscriptRecorder> =
                Arc::new(FileTranscriptRecorder::from_config(&config)?);
            let validator = ConversationValidator::new(gateway, &config.conversation);
            let session = CallSession::new(room, validator, recorder);
            let mut channel = ConsoleChannel::new();
            // Ctrl+C drops the in-flight call, and with it the session,
            // which records the transcript as aborted before we exit.
            tokio::select! {
                recorded = run_call(session, &mut channel) => {
                    let recorded = recorded?;
                    println!();
                    tracing::info!(path = %recorded.path.display(), "Call transcript saved");
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    tracing::info!("Received Ctrl+C, call aborted");
                }
            }
        }
    }

    Ok(())
}
