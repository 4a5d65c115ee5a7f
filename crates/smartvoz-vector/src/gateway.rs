//! Retrieval gateway: enhanced query, similarity search, typed evidence.
//!
//! `search` never returns `Err`. Missing indexes, provider failures and
//! timeouts are reported through [`SearchResult::failure`] so the dialogue
//! layer can degrade instead of aborting a call.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use smartvoz_core::config::SmartvozConfig;
use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::types::{CompanyRef, Document, DocumentKind, Protocol};

use crate::embedding::DynEmbeddingService;
use crate::index::{read_manifest, IndexManifest, SearchHit, VectorIndex};
use crate::provider::select_embedder;
use crate::synthesizer::{AnswerSynthesizer, ExtractiveSynthesizer, OpenAiChatSynthesizer, NO_EVIDENCE_ANSWER};

/// Number of hits returned when the caller gives no usable `top_k`.
pub const DEFAULT_TOP_K: usize = 3;

/// Upper bound on `top_k`.
pub const MAX_TOP_K: usize = 20;

/// The one place `top_k` is defaulted: missing or non-positive values
/// become [`DEFAULT_TOP_K`], large values are capped at [`MAX_TOP_K`].
pub fn clamp_top_k(top_k: Option<i64>) -> usize {
    match top_k {
        Some(k) if k > 0 => (k as u64).min(MAX_TOP_K as u64) as usize,
        _ => DEFAULT_TOP_K,
    }
}

/// Rewrite a free-text query so it serves both lookup intents: a joint
/// client-name and enterprise match, or a protocol description match.
pub fn enhance_query(query: &str) -> String {
    format!(
        "Find information about {}, if its a client it should match the enterprise name given \
         with the client name given or could be a solution context that should match the \
         description of a protocol",
        query.trim()
    )
}

/// A client as it appears in evidence: id, name and inline companies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientIdentity {
    pub id: String,
    pub name: String,
    pub companies: Vec<CompanyRef>,
}

/// Structured metadata for one retrieved document.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceHit {
    pub doc_id: String,
    pub matched_type: DocumentKind,
    /// Client, company or protocol name. Groups use the company name.
    pub matched_name: String,
    pub matched_enterprise: Option<String>,
    pub matched_protocol_id: Option<String>,
    pub clients: Vec<ClientIdentity>,
    pub companies: Vec<CompanyRef>,
    /// Service names, for service groups.
    pub services: Vec<String>,
    pub protocol: Option<Protocol>,
    pub score: f64,
}

impl EvidenceHit {
    fn from_search_hit(hit: &SearchHit) -> Self {
        let mut evidence = EvidenceHit {
            doc_id: hit.doc_id.clone(),
            matched_type: hit.document.kind(),
            matched_name: String::new(),
            matched_enterprise: None,
            matched_protocol_id: None,
            clients: Vec::new(),
            companies: Vec::new(),
            services: Vec::new(),
            protocol: None,
            score: hit.score,
        };
        match &hit.document {
            Document::Company(c) => {
                evidence.matched_name = c.name.clone();
                evidence.matched_enterprise = Some(c.name.clone());
                evidence.companies = vec![c.as_ref()];
            }
            Document::Client(c) => {
                evidence.matched_name = c.name.clone();
                evidence.matched_enterprise = c.companies.first().map(|r| r.name.clone());
                evidence.companies = c.companies.clone();
                evidence.clients = vec![ClientIdentity {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    companies: c.companies.clone(),
                }];
            }
            Document::ClientGroup(g) => {
                evidence.matched_name = g.company.name.clone();
                evidence.matched_enterprise = Some(g.company.name.clone());
                evidence.companies = vec![g.company.clone()];
                evidence.clients = g
                    .clients
                    .iter()
                    .map(|c| ClientIdentity {
                        id: c.id.clone(),
                        name: c.name.clone(),
                        companies: c.companies.clone(),
                    })
                    .collect();
            }
            Document::ServiceGroup(g) => {
                evidence.matched_name = g.company.name.clone();
                evidence.matched_enterprise = Some(g.company.name.clone());
                evidence.companies = vec![g.company.clone()];
                evidence.services = g.services.iter().map(|s| s.name.clone()).collect();
            }
            Document::Protocol(p) => {
                evidence.matched_name = p.name.clone();
                evidence.matched_protocol_id = Some(p.id.clone());
                evidence.protocol = Some(p.clone());
            }
        }
        evidence
    }
}

/// Why a search produced no evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalFailure {
    /// Stable error kind, e.g. `NotFoundError`.
    pub kind: String,
    /// Operator-facing detail. Never spoken to the caller.
    pub detail: String,
}

impl From<&SmartvozError> for RetrievalFailure {
    fn from(err: &SmartvozError) -> Self {
        Self {
            kind: err.kind().to_string(),
            detail: err.to_string(),
        }
    }
}

/// Result of one retrieval query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub enhanced_query: String,
    pub answer: String,
    /// True only when a generative synthesizer wrote `answer`. Extractive
    /// summaries describe the evidence and are not solutions.
    pub generative: bool,
    pub hits: Vec<EvidenceHit>,
    pub raw_evidence_text: String,
    pub failure: Option<RetrievalFailure>,
}

impl SearchResult {
    fn failed(query: &str, enhanced_query: String, err: &SmartvozError) -> Self {
        Self {
            query: query.to_string(),
            enhanced_query,
            answer: String::new(),
            generative: false,
            hits: Vec::new(),
            raw_evidence_text: String::new(),
            failure: Some(RetrievalFailure::from(err)),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Text form of the result: the answer and evidence, or the
    /// `ERROR[kind]: detail` sentinel.
    pub fn to_text(&self) -> String {
        match &self.failure {
            Some(f) => format!("ERROR[{}]: {}", f.kind, f.detail),
            None if self.raw_evidence_text.is_empty() => {
                format!("SEARCH RESULTS:\n{}", self.answer)
            }
            None => format!(
                "SEARCH RESULTS:\n{}\n\nEVIDENCE:\n{}",
                self.answer, self.raw_evidence_text
            ),
        }
    }
}

struct LoadedIndex {
    manifest: IndexManifest,
    index: VectorIndex,
}

/// Read-only query front end over the persisted index.
pub struct RetrievalGateway {
    index_dir: PathBuf,
    embedder: Arc<dyn DynEmbeddingService>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    timeout: Duration,
    loaded: RwLock<Option<Arc<LoadedIndex>>>,
}

impl RetrievalGateway {
    pub fn new(
        index_dir: impl Into<PathBuf>,
        embedder: Arc<dyn DynEmbeddingService>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        timeout: Duration,
    ) -> Self {
        Self {
            index_dir: index_dir.into(),
            embedder,
            synthesizer,
            timeout,
            loaded: RwLock::new(None),
        }
    }

    /// Build a gateway from configuration: the configured embedder, the
    /// configured synthesizer and `retrieval.timeout_secs`.
    ///
    /// The chat synthesizer needs the provider API key; without one the
    /// extractive synthesizer is used and a warning is logged.
    pub fn from_config(config: &SmartvozConfig) -> Result<Self> {
        let embedder = select_embedder(config)?;
        let synthesizer: Arc<dyn AnswerSynthesizer> = match config.retrieval.synthesizer.as_str() {
            "extractive" => Arc::new(ExtractiveSynthesizer::new()),
            "openai" | "openai-chat" => match &config.embedding.api_key {
                Some(key) => Arc::new(OpenAiChatSynthesizer::new(
                    key.clone(),
                    config.retrieval.chat_model.clone(),
                    config.embedding.base_url.clone(),
                    Duration::from_secs(config.embedding.request_timeout_secs),
                )?),
                None => {
                    warn!(
                        env = %config.embedding.api_key_env,
                        "Chat synthesizer needs an API key; using extractive answers"
                    );
                    Arc::new(ExtractiveSynthesizer::new())
                }
            },
            other => {
                return Err(SmartvozError::Configuration(format!(
                    "Unknown synthesizer: {}",
                    other
                )))
            }
        };
        Ok(Self::new(
            config.index_dir(),
            embedder.service,
            synthesizer,
            Duration::from_secs(config.retrieval.timeout_secs),
        ))
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Search the index for `query`, returning at most `top_k` hits
    /// (see [`clamp_top_k`]).
    pub async fn search(&self, query: &str, top_k: Option<i64>) -> SearchResult {
        let k = clamp_top_k(top_k);
        let enhanced = enhance_query(query);

        if query.trim().is_empty() {
            return SearchResult {
                query: query.to_string(),
                enhanced_query: enhanced,
                answer: NO_EVIDENCE_ANSWER.to_string(),
                generative: false,
                hits: Vec::new(),
                raw_evidence_text: String::new(),
                failure: None,
            };
        }

        match tokio::time::timeout(self.timeout, self.search_inner(query, &enhanced, k)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(error = %e, kind = e.kind(), "Retrieval failed");
                SearchResult::failed(query, enhanced, &e)
            }
            Err(_) => {
                let e = SmartvozError::Timeout(self.timeout);
                warn!(timeout = ?self.timeout, "Retrieval timed out");
                SearchResult::failed(query, enhanced, &e)
            }
        }
    }

    /// Manifest of the index currently on disk.
    pub async fn stats(&self) -> Result<IndexManifest> {
        Ok(self.current_index().await?.manifest.clone())
    }

    async fn search_inner(&self, query: &str, enhanced: &str, k: usize) -> Result<SearchResult> {
        let loaded = self.current_index().await?;
        let manifest = &loaded.manifest;
        if self.embedder.provider() != manifest.provider
            || self.embedder.model_name() != manifest.model
        {
            return Err(SmartvozError::Provider(format!(
                "Query embedder {}/{} does not match index {} built with {}/{}; rebuild the index",
                self.embedder.provider(),
                self.embedder.model_name(),
                manifest.build_id,
                manifest.provider,
                manifest.model
            )));
        }

        let vector = self.embedder.embed_boxed(enhanced).await?;
        if vector.len() != loaded.manifest.dimensions {
            return Err(SmartvozError::Provider(format!(
                "Query embedding has {} dimensions but index {} ({}/{}) has {}",
                vector.len(),
                loaded.manifest.build_id,
                loaded.manifest.provider,
                loaded.manifest.model,
                loaded.manifest.dimensions
            )));
        }

        let raw_hits = loaded.index.search(&vector, k)?;
        let hits: Vec<EvidenceHit> = raw_hits.iter().map(EvidenceHit::from_search_hit).collect();
        let raw_evidence_text = raw_hits
            .iter()
            .map(|h| format!("[{}] score={:.3}\n{}", h.doc_id, h.score, h.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        debug!(
            hits = hits.len(),
            top = hits.first().map(|h| h.doc_id.as_str()).unwrap_or("-"),
            "Retrieved evidence"
        );

        let (answer, generative) = match self
            .synthesizer
            .synthesize(query, &hits, &raw_evidence_text)
            .await
        {
            Ok(answer) => {
                let generative = self.synthesizer.is_generative() && answer != NO_EVIDENCE_ANSWER;
                (answer, generative)
            }
            Err(e) => {
                warn!(
                    synthesizer = self.synthesizer.name(),
                    error = %e,
                    "Answer synthesis failed; using extractive answer"
                );
                (ExtractiveSynthesizer::new().summarize(&hits), false)
            }
        };

        Ok(SearchResult {
            query: query.to_string(),
            enhanced_query: enhanced.to_string(),
            answer,
            generative,
            hits,
            raw_evidence_text,
            failure: None,
        })
    }

    /// The loaded index, reloaded when the on-disk build id changes.
    async fn current_index(&self) -> Result<Arc<LoadedIndex>> {
        let dir = self.index_dir.clone();
        let manifest = tokio::task::spawn_blocking(move || read_manifest(&dir))
            .await
            .map_err(|e| SmartvozError::Storage(format!("Index reader task failed: {}", e)))?;

        let manifest = match manifest {
            Ok(m) => m,
            Err(e) => {
                // A rebuild swap briefly removes the directory; keep serving
                // what is loaded.
                if let Some(current) = self.loaded.read().await.as_ref() {
                    debug!(error = %e, "Manifest unreadable; serving loaded index");
                    return Ok(current.clone());
                }
                return Err(e);
            }
        };

        if let Some(current) = self.loaded.read().await.as_ref() {
            if current.manifest.build_id == manifest.build_id {
                return Ok(current.clone());
            }
        }

        let dir = self.index_dir.clone();
        let (manifest, index) = tokio::task::spawn_blocking(move || VectorIndex::load(&dir))
            .await
            .map_err(|e| SmartvozError::Storage(format!("Index reader task failed: {}", e)))??;
        info!(
            build_id = %manifest.build_id,
            documents = manifest.document_count,
            provider = %manifest.provider,
            "Loaded vector index"
        );
        let loaded = Arc::new(LoadedIndex { manifest, index });
        *self.loaded.write().await = Some(loaded.clone());
        Ok(loaded)
    }
}
