//! Reads an exported corpus directory back into typed documents.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use smartvoz_core::error::{Result, SmartvozError};
use smartvoz_core::types::Document;

use crate::markdown::parse_protocol;

/// A parsed corpus file together with its raw text, which is what gets
/// embedded.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    pub path: PathBuf,
    pub document: Document,
    pub text: String,
}

/// Read every corpus file in `dir`, ordered by file name.
///
/// Files that are not corpus documents, or fail to parse, are skipped with a
/// warning. A missing directory is [`SmartvozError::NotFound`].
pub fn read_corpus(dir: &Path) -> Result<Vec<CorpusDocument>> {
    if !dir.is_dir() {
        return Err(SmartvozError::NotFound(format!(
            "Corpus directory {} not found",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match read_document(&path) {
            Ok(Some(doc)) => documents.push(doc),
            Ok(None) => debug!("Ignoring non-corpus file {}", path.display()),
            Err(e) => warn!("Skipping unreadable corpus file {}: {}", path.display(), e),
        }
    }
    debug!(count = documents.len(), "Corpus read from {}", dir.display());
    Ok(documents)
}

fn read_document(path: &Path) -> Result<Option<CorpusDocument>> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or_default();

    let document = match extension {
        "json" => {
            let text = fs::read_to_string(path)?;
            let document: Document = serde_json::from_str(&text)?;
            Some((document, text))
        }
        "md" => match stem.strip_prefix("protocol_") {
            Some(id) => {
                let text = fs::read_to_string(path)?;
                let protocol = parse_protocol(&text, id)?;
                Some((Document::Protocol(protocol), text))
            }
            None => None,
        },
        _ => None,
    };

    Ok(document.map(|(document, text)| CorpusDocument {
        path: path.to_path_buf(),
        document,
        text,
    }))
}
