//! Exclusive lock serialising corpus export and index builds.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use smartvoz_core::error::{Result, SmartvozError};

/// A lock older than this is assumed to be left over from a crashed run.
const STALE_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

/// Lock file held for the duration of an export or build.
///
/// Acquisition fails fast with [`SmartvozError::Busy`] while another
/// holder exists. The file is removed when the guard is dropped.
#[derive(Debug)]
pub struct RebuildLock {
    path: PathBuf,
}

impl RebuildLock {
    /// Lock file guarding `index_dir`, placed next to it.
    pub fn path_for(index_dir: &Path) -> PathBuf {
        let name = index_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        index_dir.with_file_name(format!("{}.lock", name))
    }

    pub fn acquire(index_dir: &Path) -> Result<Self> {
        let path = Self::path_for(index_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match Self::create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if Self::is_stale(&path) {
                    warn!("Removing stale rebuild lock {}", path.display());
                    fs::remove_file(&path)?;
                    return Self::create(&path).map_err(|e| Self::busy(&path, e));
                }
                Err(Self::busy(&path, e))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
        writeln!(file, "pid={}", std::process::id())?;
        file.flush()?;
        debug!("Acquired rebuild lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn is_stale(path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age > STALE_AFTER)
            .unwrap_or(false)
    }

    fn busy(path: &Path, e: std::io::Error) -> SmartvozError {
        SmartvozError::Busy(format!(
            "another export or index build holds {} ({})",
            path.display(),
            e
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RebuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release rebuild lock {}: {}", self.path.display(), e);
        } else {
            debug!("Released rebuild lock {}", self.path.display());
        }
    }
}
