//! Package validation
//!
//! This module turns an uploaded archive into a verified manifest, or
//! rejects it with the first violated rule. Validation is staged:
//!
//! 1. The archive must be a well-formed compressed container
//! 2. A manifest document must exist at the archive root
//! 3. JSON Schema validation of the manifest shape
//! 4. Semantic checks: allowed type, version shape, permission vetting,
//!    entry file presence, locale consistency
//!
//! Validation never writes to the filesystem or any store.

use crate::archive::PackageArchive;
use plinth_core::capability::vet_permissions;
use plinth_core::error::{Error, Result};
use plinth_core::schema::{SchemaValidator, MANIFEST_SCHEMA};
use plinth_core::types::{LocaleConfig, PackageManifest, PackageType, MANIFEST_FILE};
use plinth_core::version::PackageVersion;
use serde_json::Value;
use tracing::{debug, info};

/// An uploaded archive together with its validated manifest
#[derive(Debug, Clone)]
pub struct ExtensionPackage {
    pub archive: PackageArchive,
    pub manifest: PackageManifest,
}

impl ExtensionPackage {
    /// Canonical registry id: `{name}_{version}`
    pub fn id(&self) -> String {
        self.manifest.id()
    }
}

/// Validates uploaded package archives against schema and semantic rules
pub struct PackageValidator {
    schema_validator: SchemaValidator,
}

impl PackageValidator {
    /// Create a new package validator with the embedded manifest schema
    pub fn new() -> Result<Self> {
        Ok(Self {
            schema_validator: SchemaValidator::new()?,
        })
    }

    /// Validate uploaded archive bytes into an [`ExtensionPackage`].
    ///
    /// Fails with the first violated rule; on success the returned package
    /// carries both the archive and its fully validated manifest.
    pub fn validate(&self, archive_bytes: &[u8]) -> Result<ExtensionPackage> {
        let archive = PackageArchive::open(archive_bytes.to_vec())?;
        let manifest = self.validate_archive(&archive)?;

        info!(
            "Package {} v{} validated ({} files)",
            manifest.name,
            manifest.version,
            archive.entries().len()
        );

        Ok(ExtensionPackage { archive, manifest })
    }

    /// Validate an already-opened archive and return its manifest
    pub fn validate_archive(&self, archive: &PackageArchive) -> Result<PackageManifest> {
        if !archive.contains(MANIFEST_FILE) {
            return Err(Error::manifest_missing(MANIFEST_FILE));
        }
        let manifest_text = archive.read_text(MANIFEST_FILE)?;

        // Schema validation works on the raw document so shape problems
        // surface with instance paths instead of serde messages
        let value: Value = serde_yaml_ng::from_str(&manifest_text)?;
        self.schema_validator.validate(&value, MANIFEST_SCHEMA)?;

        // Allow-listed type, checked before typed deserialization so the
        // rejection names the offending tag
        let type_tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::missing_field("type"))?;
        if !PackageType::ALLOWED.contains(&type_tag) {
            return Err(Error::invalid_package_type(type_tag));
        }

        // Three dot-separated non-negative integers
        let version = value
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::missing_field("version"))?;
        PackageVersion::parse(version)?;

        let manifest: PackageManifest = serde_yaml_ng::from_str(&manifest_text)?;

        vet_permissions(&manifest.permissions)?;
        self.validate_entries(archive, &manifest)?;
        if let Some(locales) = &manifest.locales {
            self.validate_locales(archive, &manifest.name, locales)?;
        }

        debug!("Manifest {} v{} is valid", manifest.name, manifest.version);

        Ok(manifest)
    }

    /// Entry files must exist in the archive.
    ///
    /// Widgets must declare a frontend entry. Declared entries are accepted
    /// either root-relative or already laid out under `{name}/`, so both
    /// fresh uploads and re-packaged in-place installs pass.
    fn validate_entries(&self, archive: &PackageArchive, manifest: &PackageManifest) -> Result<()> {
        if manifest.package_type == PackageType::Widget && manifest.frontend_entry.is_none() {
            return Err(Error::missing_field("frontend_entry"));
        }

        if let Some(frontend) = &manifest.frontend_entry {
            Self::require_entry(archive, &manifest.name, frontend, "frontend")?;
        }

        if let Some(backend) = &manifest.backend_entry {
            Self::require_entry(archive, &manifest.name, backend, "backend")?;
        }

        Ok(())
    }

    fn require_entry(
        archive: &PackageArchive,
        name: &str,
        declared: &str,
        kind: &str,
    ) -> Result<()> {
        let nested = format!("{}/{}", name, declared);
        if archive.contains(declared) || archive.contains(&nested) {
            return Ok(());
        }
        Err(Error::missing_entry_file(kind, declared))
    }

    /// The locale block must be internally consistent and complete:
    /// non-empty `supported`, `default` a member of it, and one locale file
    /// per supported code under the declared directory.
    fn validate_locales(
        &self,
        archive: &PackageArchive,
        name: &str,
        locales: &LocaleConfig,
    ) -> Result<()> {
        if locales.supported.is_empty() {
            return Err(Error::invalid_locales("supported list must not be empty"));
        }

        if !locales.supported.contains(&locales.default) {
            return Err(Error::invalid_locales(format!(
                "default locale '{}' is not in the supported list",
                locales.default
            )));
        }

        for code in &locales.supported {
            let file = format!("{}/{}.json", locales.dir, code);
            let nested = format!("{}/{}", name, file);
            if !archive.contains(&file) && !archive.contains(&nested) {
                return Err(Error::invalid_locales(format!(
                    "missing locale file for '{}': {}",
                    code, file
                )));
            }
        }

        Ok(())
    }
}
