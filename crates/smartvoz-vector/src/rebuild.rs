//! Rebuild trigger: export the corpus and rebuild the index under one lock.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use smartvoz_core::config::SmartvozConfig;
use smartvoz_core::error::Result;
use smartvoz_corpus::{CorpusExporter, ExportReport};
use smartvoz_storage::KnowledgeSource;

use crate::builder::{BuildReport, IndexBuilder};
use crate::index::IndexManifest;
use crate::lock::RebuildLock;
use crate::provider::select_embedder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildStatus {
    Success,
    /// The index was rebuilt but some entity kinds failed to export.
    Partial,
    Failure,
}

/// Operator-facing outcome of a rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub status: RebuildStatus,
    pub message: String,
    /// Captured diagnostic lines, in order.
    pub details: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexManifest>,
}

impl RebuildReport {
    pub fn is_success(&self) -> bool {
        self.status != RebuildStatus::Failure
    }
}

/// Export every entity kind while holding the rebuild lock.
pub fn export_corpus(config: &SmartvozConfig, source: &dyn KnowledgeSource) -> Result<ExportReport> {
    let _lock = RebuildLock::acquire(&config.index_dir())?;
    CorpusExporter::from_config(source, config).export_all(&config.corpus_dir())
}

/// Build the index from the current corpus while holding the rebuild lock.
pub async fn build_index(config: &SmartvozConfig) -> Result<BuildReport> {
    let _lock = RebuildLock::acquire(&config.index_dir())?;
    build_unlocked(config).await
}

async fn build_unlocked(config: &SmartvozConfig) -> Result<BuildReport> {
    let selected = select_embedder(config)?;
    IndexBuilder::new(selected.service)
        .with_fallback(selected.fallback)
        .build(&config.corpus_dir(), &config.index_dir())
        .await
}

/// Run a full export followed by an index build.
///
/// Never returns an error: every failure is folded into the report so the
/// trigger can always answer with a structured response.
pub async fn rebuild(config: &SmartvozConfig, source: &dyn KnowledgeSource) -> RebuildReport {
    let started_at = Utc::now();
    let timer = Instant::now();
    let mut details = Vec::new();

    let finish = |status: RebuildStatus,
                  message: String,
                  details: Vec<String>,
                  index: Option<IndexManifest>| {
        let report = RebuildReport {
            status,
            message,
            details,
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
            index,
        };
        match report.status {
            RebuildStatus::Failure => error!(message = %report.message, "Rebuild failed"),
            _ => info!(
                status = ?report.status,
                duration_ms = report.duration_ms,
                "Rebuild finished"
            ),
        }
        report
    };

    let _lock = match RebuildLock::acquire(&config.index_dir()) {
        Ok(lock) => lock,
        Err(e) => {
            details.push(format!("{}: {}", e.kind(), e));
            return finish(
                RebuildStatus::Failure,
                "Rebuild already in progress".to_string(),
                details,
                None,
            );
        }
    };

    let export = match CorpusExporter::from_config(source, config).export_all(&config.corpus_dir()) {
        Ok(report) => report,
        Err(e) => {
            details.push(format!("export {}: {}", e.kind(), e));
            return finish(
                RebuildStatus::Failure,
                "Corpus export failed".to_string(),
                details,
                None,
            );
        }
    };
    for (entity, count) in &export.counts {
        details.push(format!("exported {}: {}", entity.as_str(), count));
    }
    if export.clients_aggregated {
        details.push("clients exported as per-company groups".to_string());
    }
    for failure in &export.failures {
        details.push(format!(
            "export {} failed {}: {}",
            failure.entity.as_str(),
            failure.error_kind,
            failure.message
        ));
    }

    let build = match build_unlocked(config).await {
        Ok(build) => build,
        Err(e) => {
            details.push(format!("build {}: {}", e.kind(), e));
            return finish(
                RebuildStatus::Failure,
                "Index build failed".to_string(),
                details,
                None,
            );
        }
    };
    let manifest = build.manifest;
    details.push(format!(
        "embedding provider: {} ({}){}",
        manifest.provider,
        manifest.model,
        if manifest.fallback { " [local fallback]" } else { "" }
    ));
    details.push(format!(
        "index {}: {} documents, {} dimensions",
        manifest.build_id, manifest.document_count, manifest.dimensions
    ));

    let (status, message) = if export.is_complete() {
        (RebuildStatus::Success, "Rebuild completed".to_string())
    } else {
        (
            RebuildStatus::Partial,
            format!(
                "Rebuild completed with {} failed export kind(s)",
                export.failures.len()
            ),
        )
    };
    finish(status, message, details, Some(manifest))
}
