//! Pre-update backup snapshots
//!
//! Every update job copies the current package files into a timestamped
//! directory under the backups root before anything is touched. The copy
//! is what rollback restores from; success deletes it.

use anyhow::{Context, Result};
use plinth_core::HostPaths;
use plinth_package::copy_dir;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Creates and disposes of per-update backup copies
pub struct BackupManager {
    backups_root: PathBuf,
}

impl BackupManager {
    pub fn new(paths: &HostPaths) -> Self {
        Self {
            backups_root: paths.backups_dir(),
        }
    }

    /// Copy an extension's installed files into a timestamped backup
    /// directory, returning its location
    pub fn create(&self, extension_id: &str, files: &Path) -> Result<PathBuf> {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let backup_dir = self
            .backups_root
            .join(format!("{}-{}", extension_id, timestamp));

        copy_dir(files, &backup_dir)
            .with_context(|| format!("Failed to back up {:?} to {:?}", files, backup_dir))?;

        info!("Backup created: {:?}", backup_dir);
        Ok(backup_dir)
    }

    /// Delete a backup once the job no longer needs it; never fails
    pub fn delete(&self, backup_dir: &Path) {
        match std::fs::remove_dir_all(backup_dir) {
            Ok(()) => debug!("Deleted backup {:?}", backup_dir),
            Err(e) => warn!("Failed to delete backup {:?}: {}", backup_dir, e),
        }
    }
}
