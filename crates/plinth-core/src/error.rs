//! Error types for the extension subsystem

use thiserror::Error;

/// Result type alias using plinth-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the extension package lifecycle
#[derive(Error, Debug)]
pub enum Error {
    /// Uploaded archive is not a well-formed compressed container
    #[error("Invalid package archive: {message}")]
    InvalidArchive { message: String },

    /// Archive does not contain a manifest document at its root
    #[error("Package manifest not found: expected {file} at archive root")]
    ManifestMissing { file: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Schema validation error
    #[error("Manifest schema validation failed:\n{errors}")]
    SchemaValidation { errors: String },

    /// Schema not found
    #[error("Schema not found: {name}")]
    SchemaNotFound { name: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest declares a type outside the fixed allow-list
    #[error("Unknown package type: {package_type}. Valid types: widget, theme, backend-api, extension, language")]
    InvalidPackageType { package_type: String },

    /// Version does not parse as three dot-separated non-negative integers
    #[error("Invalid version format: {version}")]
    InvalidVersion { version: String },

    /// Version constraint string could not be parsed
    #[error("Invalid version constraint: {constraint}")]
    InvalidConstraint { constraint: String },

    /// Declared entry file is absent from the package
    #[error("Missing {kind} entry file: {path}")]
    MissingEntryFile { kind: String, path: String },

    /// Locale block is inconsistent or incomplete
    #[error("Invalid locale declaration: {message}")]
    InvalidLocales { message: String },

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Manifest declares a known-dangerous permission token
    #[error("Dangerous permission rejected: {permission}")]
    DangerousPermission { permission: String },

    /// Manifest declares a permission token this host does not recognize
    #[error("Unknown permission: {permission}")]
    UnknownPermission { permission: String },

    /// Security scan produced critical findings; package was quarantined
    #[error("Security scan rejected package: {summary}")]
    SecurityRejection { summary: String },

    /// Extension code asked for a resource its capability set does not grant
    #[error("Extension {id} lacks capability: {capability}")]
    CapabilityDenied { id: String, capability: String },

    /// Declared dependencies are missing, disabled, or version-mismatched
    #[error("Dependency check failed: unresolved [{}]; conflicts [{}]", unresolved.join("; "), conflicts.join("; "))]
    DependencyCheckFailed {
        unresolved: Vec<String>,
        conflicts: Vec<String>,
    },

    /// An identical name+version pair is already registered
    #[error("Extension already installed: {id}")]
    DuplicateExtension { id: String },

    /// No registered extension under the given id
    #[error("Extension not found: {id}")]
    ExtensionNotFound { id: String },

    /// Operation not permitted from the extension's current status
    #[error("Cannot {operation} extension {id} while {status}")]
    InvalidTransition {
        id: String,
        status: String,
        operation: String,
    },

    /// Loading or initializing the extension's backend unit failed
    #[error("Extension {id} failed to initialize: {message}")]
    InitializationFailed { id: String, message: String },

    /// An update job for this extension is already in flight
    #[error("Update already in progress for extension: {id}")]
    UpdateInProgress { id: String },

    /// Update queue is not accepting jobs
    #[error("Update orchestrator is not available")]
    OrchestratorUnavailable,

    /// Rollback could not restore the pre-update files
    #[error("CRITICAL: rollback failed for extension {id}: {message}")]
    RollbackFailed { id: String, message: String },

    /// Registry document was written by an incompatible release
    #[error("Unsupported registry schema version {found} (supported: {supported})")]
    UnsupportedRegistrySchema { found: String, supported: String },

    /// Stored integrity hash no longer matches the on-disk files
    #[error("Integrity check failed for extension {id}: expected {expected}, computed {actual}")]
    IntegrityMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// Home directory could not be determined
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
}

impl Error {
    /// Create an invalid archive error
    pub fn invalid_archive(message: impl Into<String>) -> Self {
        Self::InvalidArchive {
            message: message.into(),
        }
    }

    /// Create a manifest missing error
    pub fn manifest_missing(file: impl Into<String>) -> Self {
        Self::ManifestMissing { file: file.into() }
    }

    /// Create a schema validation error from a list of errors
    pub fn schema_validation(errors: Vec<String>) -> Self {
        Self::SchemaValidation {
            errors: errors.join("\n"),
        }
    }

    /// Create a schema not found error
    pub fn schema_not_found(name: impl Into<String>) -> Self {
        Self::SchemaNotFound { name: name.into() }
    }

    /// Create an invalid package type error
    pub fn invalid_package_type(package_type: impl Into<String>) -> Self {
        Self::InvalidPackageType {
            package_type: package_type.into(),
        }
    }

    /// Create an invalid version error
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
        }
    }

    /// Create an invalid constraint error
    pub fn invalid_constraint(constraint: impl Into<String>) -> Self {
        Self::InvalidConstraint {
            constraint: constraint.into(),
        }
    }

    /// Create a missing entry file error
    pub fn missing_entry_file(kind: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MissingEntryFile {
            kind: kind.into(),
            path: path.into(),
        }
    }

    /// Create an invalid locales error
    pub fn invalid_locales(message: impl Into<String>) -> Self {
        Self::InvalidLocales {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create a dangerous permission error
    pub fn dangerous_permission(permission: impl Into<String>) -> Self {
        Self::DangerousPermission {
            permission: permission.into(),
        }
    }

    /// Create an unknown permission error
    pub fn unknown_permission(permission: impl Into<String>) -> Self {
        Self::UnknownPermission {
            permission: permission.into(),
        }
    }

    /// Create a security rejection error
    pub fn security_rejection(summary: impl Into<String>) -> Self {
        Self::SecurityRejection {
            summary: summary.into(),
        }
    }

    /// Create a capability denied error
    pub fn capability_denied(id: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::CapabilityDenied {
            id: id.into(),
            capability: capability.into(),
        }
    }

    /// Create a duplicate extension error
    pub fn duplicate_extension(id: impl Into<String>) -> Self {
        Self::DuplicateExtension { id: id.into() }
    }

    /// Create an extension not found error
    pub fn extension_not_found(id: impl Into<String>) -> Self {
        Self::ExtensionNotFound { id: id.into() }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(
        id: impl Into<String>,
        status: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            status: status.into(),
            operation: operation.into(),
        }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create an update in progress error
    pub fn update_in_progress(id: impl Into<String>) -> Self {
        Self::UpdateInProgress { id: id.into() }
    }

    /// Create a rollback failed error
    pub fn rollback_failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RollbackFailed {
            id: id.into(),
            message: message.into(),
        }
    }
}
