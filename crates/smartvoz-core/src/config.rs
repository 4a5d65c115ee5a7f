use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SmartvozError};

/// Top-level configuration for SmartVoz.
///
/// Loaded once at process start from `~/.smartvoz/config.toml` (or the path
/// given on the command line) and passed by reference to every component.
/// Credentials are resolved from the environment exactly once via
/// [`resolve_secrets`](SmartvozConfig::resolve_secrets).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmartvozConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

impl SmartvozConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SmartvozConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SmartvozError::Configuration(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Read provider credentials from the process environment.
    ///
    /// `lookup` is normally `std::env::var`; tests pass a closure. Absent
    /// keys leave the secret unset, which the index builder treats as a
    /// missing primary credential.
    pub fn resolve_secrets<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.embedding.api_key = lookup(&self.embedding.api_key_env)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if self.embedding.api_key.is_none() {
            warn!(
                env = %self.embedding.api_key_env,
                "Embedding provider API key not present in environment"
            );
        }
    }

    /// Resolve a configured path against the data directory.
    ///
    /// Absolute paths are returned unchanged; `~/` is expanded to the home
    /// directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let expanded = expand_home(path);
        if expanded.is_absolute() {
            expanded
        } else {
            self.data_dir().join(expanded)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve_path(&self.database.path)
    }

    pub fn corpus_dir(&self) -> PathBuf {
        self.resolve_path(&self.corpus.dir)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.resolve_path(&self.index.dir)
    }

    pub fn transcript_dir(&self) -> PathBuf {
        self.resolve_path(&self.recorder.transcript_dir)
    }

    pub fn local_model_dir(&self) -> PathBuf {
        self.resolve_path(&self.embedding.local_model_dir)
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Base directory for the knowledge DB, corpus, index, and transcripts.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.smartvoz/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Knowledge-base database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding companies, clients, services, protocols and call records.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "knowledge.db".to_string(),
        }
    }
}

/// Exported document corpus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory the exporter writes and the index builder reads.
    pub dir: String,
    /// Above this many client rows, clients are exported grouped per company.
    pub client_aggregation_threshold: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: "knowledge_base".to_string(),
            client_aggregation_threshold: 1000,
        }
    }
}

/// Persisted vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the persisted index (manifest + entries).
    pub dir: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: "vector_index".to_string(),
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Primary provider: "openai".
    pub provider: String,
    /// Primary embedding model name.
    pub model: String,
    /// Environment variable holding the primary provider's API key.
    pub api_key_env: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Directory with `model.onnx` + `tokenizer.json` for the local fallback.
    pub local_model_dir: String,
    /// Name recorded in the index manifest for the local model.
    pub local_model_name: String,
    /// Use the local model when the primary credentials are missing.
    pub allow_local_fallback: bool,
    /// HTTP timeout for provider requests.
    pub request_timeout_secs: u64,
    /// Resolved API key; never serialized.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-ada-002".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            local_model_dir: "models/bge-small-en-v1.5".to_string(),
            local_model_name: "BAAI/bge-small-en-v1.5".to_string(),
            allow_local_fallback: true,
            request_timeout_secs: 30,
            api_key: None,
        }
    }
}

/// Retrieval gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Upper bound on a single retrieval (embed + search + synthesis).
    pub timeout_secs: u64,
    /// Answer synthesizer: "extractive" or "openai".
    pub synthesizer: String,
    /// Chat model used by the "openai" synthesizer.
    pub chat_model: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            synthesizer: "extractive".to_string(),
            chat_model: "gpt-4o".to_string(),
        }
    }
}

/// Dialogue policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Name the agent introduces itself with.
    pub agent_name: String,
    /// Identity attempts allowed before the agent stops accepting new ones.
    pub max_identity_attempts: u32,
    /// Words that mark an utterance as outside the caller/company/issue scope.
    pub off_topic_keywords: Vec<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            agent_name: "SmartVoz".to_string(),
            max_identity_attempts: 3,
            off_topic_keywords: [
                "clima", "weather", "futbol", "fútbol", "football", "partido", "chiste", "joke",
                "receta", "recipe", "politica", "política", "politics", "pelicula", "película",
                "movie", "musica", "música", "music", "horoscopo", "horóscopo", "elecciones",
                "presidente", "capital de",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Transcript recorder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory for per-call transcript JSON blobs.
    pub transcript_dir: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            transcript_dir: "transcripts".to_string(),
        }
    }
}
