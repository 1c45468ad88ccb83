//! Persistent registry record types

use crate::types::manifest::{PackageManifest, PackageType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of an installed extension
///
/// Transitions: `validated -> inactive -> active <-> error`, with
/// `inactive|active -> quarantined` (manual approve returns to `inactive`)
/// and any status -> removed (record deleted, not represented here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionStatus {
    Validated,
    Inactive,
    Active,
    Error,
    Quarantined,
}

impl std::fmt::Display for ExtensionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtensionStatus::Validated => write!(f, "validated"),
            ExtensionStatus::Inactive => write!(f, "inactive"),
            ExtensionStatus::Active => write!(f, "active"),
            ExtensionStatus::Error => write!(f, "error"),
            ExtensionStatus::Quarantined => write!(f, "quarantined"),
        }
    }
}

/// Outcome of the security scan, summarized onto the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityStatus {
    Safe,
    Warning,
    Quarantined,
}

impl std::fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityStatus::Safe => write!(f, "safe"),
            SecurityStatus::Warning => write!(f, "warning"),
            SecurityStatus::Quarantined => write!(f, "quarantined"),
        }
    }
}

/// One installed package instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionRecord {
    /// Canonical id: `{name}_{version}`
    pub id: String,

    /// Package name
    pub name: String,

    /// Installed version
    pub version: String,

    /// Package type
    pub package_type: PackageType,

    /// Full validated manifest
    pub manifest: PackageManifest,

    /// On-disk root of the extracted, flattened package files
    pub file_path: PathBuf,

    /// Content hash over all package files, computed at install time
    pub integrity_hash: String,

    /// Security scan summary
    pub security_status: SecurityStatus,

    /// Lifecycle status
    pub status: ExtensionStatus,

    /// Whether the extension is currently enabled
    pub is_enabled: bool,

    /// User who uploaded the package, also the quarantine tree key
    pub installed_by: String,

    /// Populated when status is `error` or `quarantined`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Install timestamp (UTC)
    pub installed_at: DateTime<Utc>,

    /// Last mutation timestamp (UTC)
    pub updated_at: DateTime<Utc>,
}

impl ExtensionRecord {
    /// Build a freshly validated record, prior to persistence
    pub fn new(
        manifest: PackageManifest,
        file_path: PathBuf,
        integrity_hash: String,
        security_status: SecurityStatus,
        installed_by: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: manifest.id(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            package_type: manifest.package_type,
            manifest,
            file_path,
            integrity_hash,
            security_status,
            status: ExtensionStatus::Validated,
            is_enabled: false,
            installed_by: installed_by.to_string(),
            error_message: None,
            installed_at: now,
            updated_at: now,
        }
    }

    /// Stamp `updated_at` after a mutation
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
