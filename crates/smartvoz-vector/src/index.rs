//! Persisted vector index with brute-force cosine similarity search.
//!
//! On disk an index is a directory holding `manifest.json` (build id,
//! provider, model, dimensions, document count) and `entries.json` (one
//! entry per corpus document). It is written once per rebuild and only
//! ever replaced wholesale.

use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::fsutil;
use smartvoz_core::types::Document;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ENTRIES_FILE: &str = "entries.json";

/// Describes one build of the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub build_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub document_count: usize,
    /// True when the local model was used because the primary provider had
    /// no credentials.
    #[serde(default)]
    pub fallback: bool,
}

/// One embedded corpus document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub doc_id: String,
    pub embedding: Vec<f32>,
    pub document: Document,
    /// The corpus text the embedding was computed from.
    pub text: String,
}

/// A single hit returned from a vector search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub doc_id: String,
    /// Cosine similarity score.
    pub score: f64,
    pub document: Document,
    pub text: String,
}

/// In-memory vector index.
///
/// Entries keep insertion order; equal scores are ordered by document id so
/// repeated searches return identical rankings.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Arc<RwLock<Vec<IndexEntry>>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<IndexEntry>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Insert an entry, replacing any entry with the same document id.
    pub fn insert(&self, entry: IndexEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| SmartvozError::Storage(format!("Lock poisoned: {}", e)))?;
        entries.retain(|e| e.doc_id != entry.doc_id);
        entries.push(entry);
        Ok(())
    }

    /// The `k` entries most similar to `query`, by descending cosine score.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| SmartvozError::Storage(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<(f64, &IndexEntry)> = entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.embedding), entry))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.doc_id.cmp(&b.1.doc_id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, entry)| SearchHit {
                doc_id: entry.doc_id.clone(),
                score,
                document: entry.document.clone(),
                text: entry.text.clone(),
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `entries.json` and `manifest.json` into `dir`. The manifest is
    /// written last.
    pub fn save(&self, dir: &Path, manifest: &IndexManifest) -> Result<()> {
        fs::create_dir_all(dir)?;
        let entries = self
            .entries
            .read()
            .map_err(|e| SmartvozError::Storage(format!("Lock poisoned: {}", e)))?;
        let data = serde_json::to_vec(&*entries)?;
        fsutil::atomic_write(&dir.join(ENTRIES_FILE), &data)?;
        let manifest_json = serde_json::to_vec_pretty(manifest)?;
        fsutil::atomic_write(&dir.join(MANIFEST_FILE), &manifest_json)?;
        debug!(entries = entries.len(), "Index saved to {}", dir.display());
        Ok(())
    }

    /// Load a persisted index.
    pub fn load(dir: &Path) -> Result<(IndexManifest, VectorIndex)> {
        let manifest = read_manifest(dir)?;
        let data = fs::read(dir.join(ENTRIES_FILE)).map_err(|e| {
            SmartvozError::NotFound(format!(
                "Vector index entries missing in {}: {}",
                dir.display(),
                e
            ))
        })?;
        let entries: Vec<IndexEntry> = serde_json::from_slice(&data)?;
        if entries.len() != manifest.document_count {
            return Err(SmartvozError::Storage(format!(
                "Index {} lists {} documents but holds {}",
                manifest.build_id,
                manifest.document_count,
                entries.len()
            )));
        }
        Ok((manifest, VectorIndex::from_entries(entries)))
    }
}

/// Read only the manifest of a persisted index.
pub fn read_manifest(dir: &Path) -> Result<IndexManifest> {
    let path = dir.join(MANIFEST_FILE);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SmartvozError::NotFound(format!(
                "Vector index not found at {}",
                dir.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&data)?)
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
