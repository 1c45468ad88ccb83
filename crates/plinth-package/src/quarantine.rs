//! Quarantine storage for packages that failed security screening
//!
//! Quarantined packages live under `{root}/{owner}/{name_version}/`, apart
//! from the normal install tree. Quarantining the same key twice replaces
//! the earlier copy, so repeated rejections of one upload stay idempotent.

use chrono::{DateTime, Utc};
use plinth_core::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Metadata file written beside quarantined package files
pub const QUARANTINE_METADATA_FILE: &str = "quarantine.json";

/// Why and when a package was quarantined
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineNotice {
    /// Human-readable reason, usually the scan summary
    pub reason: String,

    /// Where the files came from
    pub source_path: PathBuf,

    /// When the package was quarantined (UTC)
    pub quarantined_at: DateTime<Utc>,
}

/// Moves rejected packages into an isolated directory tree
#[derive(Debug, Clone)]
pub struct QuarantineStore {
    root: PathBuf,
}

impl QuarantineStore {
    /// Create a store rooted at the given quarantine directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Quarantine directory for one owner + name_version key
    pub fn path_for(&self, owner: &str, key: &str) -> PathBuf {
        self.root.join(owner).join(key)
    }

    /// Whether a quarantine copy exists for the key
    pub fn contains(&self, owner: &str, key: &str) -> bool {
        self.path_for(owner, key).is_dir()
    }

    /// Move a package's files into quarantine.
    ///
    /// Replaces any prior quarantine copy of the same key, writes a
    /// [`QuarantineNotice`] beside the files, and removes the source
    /// directory. Returns the quarantine location.
    pub fn quarantine(
        &self,
        package_root: &Path,
        owner: &str,
        key: &str,
        reason: &str,
    ) -> Result<PathBuf> {
        let dest = self.path_for(owner, key);

        if dest.exists() {
            warn!("Replacing existing quarantine copy: {:?}", dest);
            std::fs::remove_dir_all(&dest)?;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        move_dir(package_root, &dest)?;

        let notice = QuarantineNotice {
            reason: reason.to_string(),
            source_path: package_root.to_path_buf(),
            quarantined_at: Utc::now(),
        };
        let metadata = serde_json::to_string_pretty(&notice)?;
        std::fs::write(dest.join(QUARANTINE_METADATA_FILE), metadata)?;

        info!("Quarantined package {} for {}: {}", key, owner, reason);

        Ok(dest)
    }

    /// Read the notice written for a quarantined key
    pub fn notice(&self, owner: &str, key: &str) -> Result<QuarantineNotice> {
        let content = std::fs::read_to_string(self.path_for(owner, key).join(QUARANTINE_METADATA_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Move a quarantined package back out, dropping the notice file.
    ///
    /// Used by manual approval to restore files into the install tree.
    pub fn release(&self, owner: &str, key: &str, dest: &Path) -> Result<()> {
        let source = self.path_for(owner, key);
        let notice = source.join(QUARANTINE_METADATA_FILE);
        if notice.exists() {
            std::fs::remove_file(&notice)?;
        }

        if dest.exists() {
            std::fs::remove_dir_all(dest)?;
        }
        move_dir(&source, dest)?;

        // Drop the now-empty owner directory if nothing else is quarantined
        if let Some(owner_dir) = source.parent() {
            let _ = std::fs::remove_dir(owner_dir);
        }

        info!("Released {} for {} to {:?}", key, owner, dest);

        Ok(())
    }

    /// Delete a quarantine copy outright
    pub fn remove(&self, owner: &str, key: &str) -> Result<()> {
        let path = self.path_for(owner, key);
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        Ok(())
    }
}

/// Move a directory tree, falling back to copy + delete across filesystems
pub fn move_dir(source: &Path, dest: &Path) -> Result<()> {
    if std::fs::rename(source, dest).is_ok() {
        return Ok(());
    }

    copy_dir(source, dest)?;
    std::fs::remove_dir_all(source)?;
    Ok(())
}

/// Recursively copy a directory tree
pub fn copy_dir(source: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            plinth_core::Error::invalid_archive(format!("failed to walk {}: {}", source.display(), e))
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}
