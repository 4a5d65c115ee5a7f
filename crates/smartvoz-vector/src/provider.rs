//! Embedding provider selection from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use smartvoz_core::config::SmartvozConfig;
use smartvoz_core::error::{Result, SmartvozError};

use crate::embedding::{DynEmbeddingService, MockEmbedding, OnnxEmbeddingService, OpenAiEmbedding};

/// The embedding provider chosen for a build or for serving.
#[derive(Clone)]
pub struct SelectedEmbedder {
    pub service: Arc<dyn DynEmbeddingService>,
    /// True when the local model stands in for the primary provider.
    pub fallback: bool,
}

impl std::fmt::Debug for SelectedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedEmbedder")
            .field("provider", &self.service.provider())
            .field("model", &self.service.model_name())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Choose the embedding provider named by `embedding.provider`.
///
/// - `openai`: the primary provider. Without an API key the local model is
///   used instead when `allow_local_fallback` is set, with a warning;
///   otherwise this is a configuration error.
/// - `onnx` / `local`: the local sentence-transformer model.
/// - `mock`: the deterministic lexical embedder.
pub fn select_embedder(config: &SmartvozConfig) -> Result<SelectedEmbedder> {
    let emb = &config.embedding;
    match emb.provider.as_str() {
        "openai" => match &emb.api_key {
            Some(key) => {
                let service = OpenAiEmbedding::new(
                    key.clone(),
                    emb.model.clone(),
                    emb.base_url.clone(),
                    Duration::from_secs(emb.request_timeout_secs),
                )?;
                info!(model = %emb.model, "Using OpenAI embeddings");
                Ok(SelectedEmbedder {
                    service: Arc::new(service),
                    fallback: false,
                })
            }
            None if emb.allow_local_fallback => {
                warn!(
                    env = %emb.api_key_env,
                    model = %emb.local_model_name,
                    "Primary embedding credentials missing; falling back to the local model"
                );
                let service = load_local(config).map_err(|e| {
                    SmartvozError::Configuration(format!(
                        "{} is not set and the local fallback model is unavailable: {}",
                        emb.api_key_env, e
                    ))
                })?;
                Ok(SelectedEmbedder {
                    service,
                    fallback: true,
                })
            }
            None => Err(SmartvozError::Configuration(format!(
                "{} is not set and local fallback is disabled",
                emb.api_key_env
            ))),
        },
        "onnx" | "local" => Ok(SelectedEmbedder {
            service: load_local(config)?,
            fallback: false,
        }),
        "mock" => {
            info!("Using deterministic mock embeddings");
            Ok(SelectedEmbedder {
                service: Arc::new(MockEmbedding::new()),
                fallback: false,
            })
        }
        other => Err(SmartvozError::Configuration(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

fn load_local(config: &SmartvozConfig) -> Result<Arc<dyn DynEmbeddingService>> {
    let service = OnnxEmbeddingService::from_directory(
        &config.local_model_dir(),
        config.embedding.local_model_name.clone(),
    )?;
    Ok(Arc::new(service))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> SmartvozConfig {
        let mut config = SmartvozConfig::default();
        config.general.data_dir = "/nonexistent/smartvoz".to_string();
        config.embedding.provider = provider.to_string();
        config
    }

    #[test]
    fn test_mock_provider() {
        let selected = select_embedder(&config("mock")).unwrap();
        assert_eq!(selected.service.provider(), "mock");
        assert!(!selected.fallback);
    }

    #[test]
    fn test_openai_with_key() {
        let mut config = config("openai");
        config.embedding.api_key = Some("sk-test".to_string());
        let selected = select_embedder(&config).unwrap();
        assert_eq!(selected.service.provider(), "openai");
        assert_eq!(selected.service.model_name(), "text-embedding-ada-002");
        assert_eq!(selected.service.dimensions(), 1536);
    }

    #[test]
    fn test_openai_without_key_and_no_fallback_fails_loudly() {
        let mut config = config("openai");
        config.embedding.allow_local_fallback = false;
        let err = select_embedder(&config).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_fallback_without_local_model_reports_both_causes() {
        let err = select_embedder(&config("openai")).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
        let msg = err.to_string();
        assert!(msg.contains("OPENAI_API_KEY"));
        assert!(msg.contains("ONNX model not found"));
    }

    #[test]
    fn test_unknown_provider() {
        let err = select_embedder(&config("cohere")).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }
}
