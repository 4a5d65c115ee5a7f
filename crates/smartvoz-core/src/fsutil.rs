//! Copy-on-build helpers: stage a directory next to its target and swap it
//! into place, so readers never observe a half-written corpus or index.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SmartvozError};

fn sibling(target: &Path, suffix: &str) -> Result<PathBuf> {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            SmartvozError::Configuration(format!("Invalid directory path: {}", target.display()))
        })?;
    Ok(target.with_file_name(format!(".{}.{}", name, suffix)))
}

/// Create an empty staging directory for `target`, discarding leftovers
/// from an interrupted earlier run.
pub fn prepare_staging(target: &Path) -> Result<PathBuf> {
    let staging = sibling(target, "staging")?;
    if staging.exists() {
        debug!("Removing stale staging directory {}", staging.display());
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;
    Ok(staging)
}

/// Replace `target` with `staging`.
///
/// The old directory is renamed aside first and removed after the new one
/// is in place. If the final rename fails the old directory is restored.
pub fn swap_dir(staging: &Path, target: &Path) -> Result<()> {
    let backup = sibling(target, "old")?;
    if backup.exists() {
        fs::remove_dir_all(&backup)?;
    }

    let had_previous = target.exists();
    if had_previous {
        fs::rename(target, &backup)?;
    }

    if let Err(e) = fs::rename(staging, target) {
        if had_previous {
            if let Err(restore) = fs::rename(&backup, target) {
                warn!(
                    "Failed to restore {} after aborted swap: {}",
                    target.display(),
                    restore
                );
            }
        }
        return Err(e.into());
    }

    if had_previous {
        if let Err(e) = fs::remove_dir_all(&backup) {
            warn!("Failed to remove superseded {}: {}", backup.display(), e);
        }
    }
    debug!("Swapped {} into place", target.display());
    Ok(())
}

/// Write a file through a temporary sibling and rename it over the target.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_replaces_previous_contents() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("corpus");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.json"), "{}").unwrap();

        let staging = prepare_staging(&target).unwrap();
        fs::write(staging.join("fresh.json"), "{}").unwrap();
        swap_dir(&staging, &target).unwrap();

        assert!(target.join("fresh.json").exists());
        assert!(!target.join("stale.json").exists());
        assert!(!staging.exists());
        assert!(!root.path().join(".corpus.old").exists());
    }

    #[test]
    fn test_swap_without_previous_target() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("index");
        let staging = prepare_staging(&target).unwrap();
        fs::write(staging.join("manifest.json"), "{}").unwrap();
        swap_dir(&staging, &target).unwrap();
        assert!(target.join("manifest.json").exists());
    }

    #[test]
    fn test_prepare_staging_clears_leftovers() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("corpus");
        let staging = prepare_staging(&target).unwrap();
        fs::write(staging.join("half.json"), "{").unwrap();

        let again = prepare_staging(&target).unwrap();
        assert_eq!(again, staging);
        assert_eq!(fs::read_dir(&again).unwrap().count(), 0);
    }

    #[test]
    fn test_atomic_write() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("manifest.json");
        atomic_write(&path, b"{\"a\":1}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}");
        assert!(!root.path().join("manifest.tmp").exists());
    }
}
