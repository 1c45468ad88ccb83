//! Persistent extension record store
//!
//! Installed extensions are tracked in a versioned YAML document
//! (`registry.yaml` under the host data root):
//!
//! ```yaml
//! schema_version: "1.0.0"
//! host_version: "0.3.1"
//! last_updated: "2026-08-25T10:00:00Z"
//! extensions:
//!   clock_1.2.0:
//!     name: clock
//!     version: "1.2.0"
//!     status: inactive
//! ```
//!
//! The document's `schema_version` major must match the supported major;
//! a document written by an incompatible release is refused rather than
//! silently migrated.

use chrono::{DateTime, Utc};
use plinth_core::types::ExtensionRecord;
use plinth_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Schema version written into new registry documents
pub const REGISTRY_SCHEMA_VERSION: &str = "1.0.0";

/// Document major this release can load
const SUPPORTED_SCHEMA_MAJOR: u64 = 1;

/// On-disk registry document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    /// Document format version (semver)
    pub schema_version: String,

    /// Host release that last wrote the document
    pub host_version: String,

    /// Last save timestamp (UTC)
    pub last_updated: DateTime<Utc>,

    /// Installed extensions keyed by id (`{name}_{version}`)
    pub extensions: BTreeMap<String, ExtensionRecord>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            schema_version: REGISTRY_SCHEMA_VERSION.to_string(),
            host_version: env!("CARGO_PKG_VERSION").to_string(),
            last_updated: Utc::now(),
            extensions: BTreeMap::new(),
        }
    }
}

/// Record store backed by the registry document
#[derive(Debug)]
pub struct RecordStore {
    registry_path: PathBuf,
    document: RegistryDocument,
}

impl RecordStore {
    /// Load the store, creating an empty document if none exists
    pub fn new(registry_path: PathBuf) -> Result<Self> {
        debug!("Loading registry document from: {:?}", registry_path);

        let document = if registry_path.exists() {
            Self::load_document(&registry_path)?
        } else {
            info!("Creating new registry document at: {:?}", registry_path);
            let document = RegistryDocument::default();
            if let Some(parent) = registry_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Self::save_document(&registry_path, &document)?;
            document
        };

        Ok(Self {
            registry_path,
            document,
        })
    }

    fn load_document(path: &Path) -> Result<RegistryDocument> {
        let content = std::fs::read_to_string(path)?;
        let document: RegistryDocument = serde_yaml_ng::from_str(&content)?;
        Self::check_schema_version(&document.schema_version)?;
        debug!(
            "Loaded registry with {} extensions",
            document.extensions.len()
        );
        Ok(document)
    }

    fn check_schema_version(found: &str) -> Result<()> {
        let parsed = semver::Version::parse(found).map_err(|_| Error::UnsupportedRegistrySchema {
            found: found.to_string(),
            supported: REGISTRY_SCHEMA_VERSION.to_string(),
        })?;
        if parsed.major != SUPPORTED_SCHEMA_MAJOR {
            return Err(Error::UnsupportedRegistrySchema {
                found: found.to_string(),
                supported: REGISTRY_SCHEMA_VERSION.to_string(),
            });
        }
        Ok(())
    }

    fn save_document(path: &Path, document: &RegistryDocument) -> Result<()> {
        let content = serde_yaml_ng::to_string(document)?;
        std::fs::write(path, content)?;
        debug!(
            "Saved registry with {} extensions",
            document.extensions.len()
        );
        Ok(())
    }

    /// Persist the current document, stamping `last_updated`
    pub fn save(&mut self) -> Result<()> {
        self.document.last_updated = Utc::now();
        self.document.host_version = env!("CARGO_PKG_VERSION").to_string();
        Self::save_document(&self.registry_path, &self.document)
    }

    /// Whether a record exists for the given id
    pub fn contains(&self, id: &str) -> bool {
        self.document.extensions.contains_key(id)
    }

    /// Get a record by id
    pub fn get(&self, id: &str) -> Option<&ExtensionRecord> {
        self.document.extensions.get(id)
    }

    /// Get a mutable record by id
    pub fn get_mut(&mut self, id: &str) -> Option<&mut ExtensionRecord> {
        self.document.extensions.get_mut(id)
    }

    /// Insert a new record, rejecting an existing id
    pub fn insert(&mut self, record: ExtensionRecord) -> Result<()> {
        if self.contains(&record.id) {
            return Err(Error::duplicate_extension(&record.id));
        }
        self.document.extensions.insert(record.id.clone(), record);
        Ok(())
    }

    /// Insert or replace a record
    pub fn upsert(&mut self, record: ExtensionRecord) {
        self.document.extensions.insert(record.id.clone(), record);
    }

    /// Remove a record, returning it if present
    pub fn remove(&mut self, id: &str) -> Option<ExtensionRecord> {
        self.document.extensions.remove(id)
    }

    /// All installed records of a given package name, any version
    pub fn find_by_name(&self, name: &str) -> Vec<&ExtensionRecord> {
        self.document
            .extensions
            .values()
            .filter(|record| record.name == name)
            .collect()
    }

    /// All records in id order
    pub fn list(&self) -> Vec<&ExtensionRecord> {
        self.document.extensions.values().collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.document.extensions.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.document.extensions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::types::{PackageManifest, SecurityStatus};
    use tempfile::TempDir;

    fn record(name: &str, version: &str) -> ExtensionRecord {
        let manifest: PackageManifest = serde_yaml_ng::from_str(&format!(
            "name: {}\nversion: {}\ntype: extension\nbackend_entry: index.js\n",
            name, version
        ))
        .unwrap();
        ExtensionRecord::new(
            manifest,
            PathBuf::from(format!("/data/extensions/{}_{}", name, version)),
            "deadbeef".to_string(),
            SecurityStatus::Safe,
            "alice",
        )
    }

    #[test]
    fn test_new_store_writes_empty_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.yaml");

        let store = RecordStore::new(path.clone()).unwrap();
        assert!(store.is_empty());
        assert!(path.exists());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("schema_version"));
        assert!(content.contains(REGISTRY_SCHEMA_VERSION));
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let temp = TempDir::new().unwrap();
        let mut store = RecordStore::new(temp.path().join("registry.yaml")).unwrap();

        store.insert(record("clock", "1.0.0")).unwrap();
        let err = store.insert(record("clock", "1.0.0")).unwrap_err();
        assert!(matches!(err, Error::DuplicateExtension { ref id } if id == "clock_1.0.0"));

        // Same name, different version is a distinct record
        store.insert(record("clock", "1.1.0")).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.find_by_name("clock").len(), 2);
    }

    #[test]
    fn test_round_trips_through_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.yaml");

        let mut store = RecordStore::new(path.clone()).unwrap();
        store.insert(record("clock", "1.0.0")).unwrap();
        store.save().unwrap();

        let reloaded = RecordStore::new(path).unwrap();
        assert_eq!(reloaded.len(), 1);
        let rec = reloaded.get("clock_1.0.0").unwrap();
        assert_eq!(rec.name, "clock");
        assert_eq!(rec.manifest.backend_entry.as_deref(), Some("index.js"));
    }

    #[test]
    fn test_future_schema_major_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.yaml");
        std::fs::write(
            &path,
            "schema_version: \"2.0.0\"\nhost_version: \"9.9.9\"\nlast_updated: \"2026-01-01T00:00:00Z\"\nextensions: {}\n",
        )
        .unwrap();

        let err = RecordStore::new(path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedRegistrySchema { ref found, .. } if found == "2.0.0"));
    }

    #[test]
    fn test_malformed_schema_version_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.yaml");
        std::fs::write(
            &path,
            "schema_version: \"not-a-version\"\nhost_version: \"0.1.0\"\nlast_updated: \"2026-01-01T00:00:00Z\"\nextensions: {}\n",
        )
        .unwrap();

        let err = RecordStore::new(path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedRegistrySchema { .. }));
    }

    #[test]
    fn test_remove_returns_record() {
        let temp = TempDir::new().unwrap();
        let mut store = RecordStore::new(temp.path().join("registry.yaml")).unwrap();

        store.insert(record("clock", "1.0.0")).unwrap();
        let removed = store.remove("clock_1.0.0").unwrap();
        assert_eq!(removed.version, "1.0.0");
        assert!(store.remove("clock_1.0.0").is_none());
        assert!(store.is_empty());
    }
}
