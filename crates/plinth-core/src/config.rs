//! On-disk layout for the extension subsystem
//!
//! Everything lives under one data root:
//! - `extensions/`: one flattened directory per installed package
//! - `quarantine/`: isolated copies of rejected packages
//! - `backups/`: pre-update snapshots
//! - `registry.yaml`: the persistent record table
//! - `events.jsonl`: append-only lifecycle audit trail

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Directory name under the user's home when no explicit root is given
const DEFAULT_DATA_DIR: &str = ".plinth";

/// Resolved filesystem layout, handed to every component
#[derive(Debug, Clone)]
pub struct HostPaths {
    data_root: PathBuf,
}

impl HostPaths {
    /// Use an explicit data root
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    /// Resolve the default data root under the user's home directory
    pub fn resolve() -> Result<Self> {
        Ok(Self::new(get_home_dir()?.join(DEFAULT_DATA_DIR)))
    }

    /// The data root itself
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Install root holding one directory per extension id
    pub fn extensions_dir(&self) -> PathBuf {
        self.data_root.join("extensions")
    }

    /// Install directory for one extension id
    pub fn extension_dir(&self, id: &str) -> PathBuf {
        self.extensions_dir().join(id)
    }

    /// Quarantine root, keyed below by owner and name+version
    pub fn quarantine_dir(&self) -> PathBuf {
        self.data_root.join("quarantine")
    }

    /// Pre-update backup root
    pub fn backups_dir(&self) -> PathBuf {
        self.data_root.join("backups")
    }

    /// Persistent registry document
    pub fn registry_file(&self) -> PathBuf {
        self.data_root.join("registry.yaml")
    }

    /// Append-only event ledger
    pub fn ledger_file(&self) -> PathBuf {
        self.data_root.join("events.jsonl")
    }

    /// Create the directory skeleton if it does not exist
    pub fn ensure_layout(&self) -> Result<()> {
        std::fs::create_dir_all(self.extensions_dir())?;
        std::fs::create_dir_all(self.quarantine_dir())?;
        std::fs::create_dir_all(self.backups_dir())?;
        Ok(())
    }
}

/// Get the user's home directory
///
/// Prefers the HOME environment variable over dirs::home_dir() so container
/// setups that remap HOME behave the same as the shell scripts around them.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        return Ok(PathBuf::from(home));
    }

    dirs::home_dir().ok_or(Error::HomeDirUnavailable)
}
