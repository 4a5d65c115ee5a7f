//! Index builder: embeds the whole corpus and swaps a fresh index into place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::fsutil;
use smartvoz_corpus::read_corpus;

use crate::embedding::DynEmbeddingService;
use crate::index::{IndexEntry, IndexManifest, VectorIndex};

/// Texts longer than this are cut before embedding. Aggregated client
/// documents can exceed provider input limits.
pub const MAX_EMBED_CHARS: usize = 24_000;

const EMBED_BATCH: usize = 64;

/// Summary of a completed build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub index_dir: PathBuf,
    pub manifest: IndexManifest,
}

/// Builds the persisted index from a corpus directory.
pub struct IndexBuilder {
    embedder: Arc<dyn DynEmbeddingService>,
    fallback: bool,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn DynEmbeddingService>) -> Self {
        Self {
            embedder,
            fallback: false,
        }
    }

    /// Mark the embedder as the local fallback in the manifest.
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    /// Embed every document in `corpus_dir` and replace the index at
    /// `index_dir`.
    ///
    /// The new index is written to a staging directory first; the previous
    /// index stays in place until the swap. An empty corpus is
    /// [`SmartvozError::NotFound`].
    pub async fn build(&self, corpus_dir: &Path, index_dir: &Path) -> Result<BuildReport> {
        let documents = read_corpus(corpus_dir)?;
        if documents.is_empty() {
            return Err(SmartvozError::NotFound(format!(
                "Corpus directory {} contains no documents",
                corpus_dir.display()
            )));
        }
        info!(
            documents = documents.len(),
            provider = self.embedder.provider(),
            model = self.embedder.model_name(),
            "Building vector index"
        );

        let texts: Vec<String> = documents
            .iter()
            .map(|d| truncate_for_embedding(&d.text).to_string())
            .collect();

        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(EMBED_BATCH) {
            embeddings.extend(self.embedder.embed_batch_boxed(chunk).await?);
            debug!(done = embeddings.len(), total = texts.len(), "Embedded documents");
        }
        if embeddings.len() != documents.len() {
            return Err(SmartvozError::Provider(format!(
                "Provider returned {} embeddings for {} documents",
                embeddings.len(),
                documents.len()
            )));
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            return Err(SmartvozError::Provider(format!(
                "Inconsistent embedding sizes: {} and {}",
                dimensions,
                bad.len()
            )));
        }

        let entries: Vec<IndexEntry> = documents
            .into_iter()
            .zip(embeddings)
            .map(|(doc, embedding)| IndexEntry {
                doc_id: doc.document.doc_id(),
                embedding,
                document: doc.document,
                text: doc.text,
            })
            .collect();

        let manifest = IndexManifest {
            build_id: Uuid::new_v4(),
            created_at: Utc::now(),
            provider: self.embedder.provider().to_string(),
            model: self.embedder.model_name().to_string(),
            dimensions,
            document_count: entries.len(),
            fallback: self.fallback,
        };

        let staging = fsutil::prepare_staging(index_dir)?;
        VectorIndex::from_entries(entries).save(&staging, &manifest)?;
        fsutil::swap_dir(&staging, index_dir)?;

        info!(
            build_id = %manifest.build_id,
            documents = manifest.document_count,
            dimensions,
            "Vector index built at {}",
            index_dir.display()
        );
        Ok(BuildReport {
            index_dir: index_dir.to_path_buf(),
            manifest,
        })
    }
}

/// Cut `text` to at most [`MAX_EMBED_CHARS`] characters.
pub fn truncate_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
