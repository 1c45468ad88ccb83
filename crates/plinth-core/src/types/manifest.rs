//! Manifest type definitions matching extension-manifest.schema.json

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File name of the manifest document at the archive root
pub const MANIFEST_FILE: &str = "extension.yaml";

/// Package types the host accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageType {
    Widget,
    Theme,
    BackendApi,
    Extension,
    Language,
}

impl PackageType {
    /// All accepted type tags, as they appear in manifests
    pub const ALLOWED: &'static [&'static str] =
        &["widget", "theme", "backend-api", "extension", "language"];
}

impl std::fmt::Display for PackageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageType::Widget => write!(f, "widget"),
            PackageType::Theme => write!(f, "theme"),
            PackageType::BackendApi => write!(f, "backend-api"),
            PackageType::Extension => write!(f, "extension"),
            PackageType::Language => write!(f, "language"),
        }
    }
}

/// Validated manifest document from a package archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package name, unique together with version
    pub name: String,

    /// Semantic version (three dot-separated integers)
    pub version: String,

    /// Package type from the fixed allow-list
    #[serde(rename = "type")]
    pub package_type: PackageType,

    /// Short description
    #[serde(default)]
    pub description: Option<String>,

    /// Author name
    #[serde(default)]
    pub author: Option<String>,

    /// Capability tags the package requests
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Extension-name -> version constraint
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,

    /// Path of the backend entry file, relative to the package root
    #[serde(default)]
    pub backend_entry: Option<String>,

    /// Path of the frontend entry file, required for widgets
    #[serde(default)]
    pub frontend_entry: Option<String>,

    /// Locale declaration
    #[serde(default)]
    pub locales: Option<LocaleConfig>,
}

impl PackageManifest {
    /// Canonical registry id for this manifest: `{name}_{version}`
    pub fn id(&self) -> String {
        format!("{}_{}", self.name, self.version)
    }
}

/// One declared dependency: bare constraint string or detailed form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// `dependency-name: ">=1.2.0"`
    Constraint(String),
    /// `dependency-name: { version: ">=1.2.0", optional: true }`
    Detailed {
        version: String,
        #[serde(default)]
        optional: bool,
    },
}

impl DependencySpec {
    /// The declared constraint string
    pub fn constraint(&self) -> &str {
        match self {
            DependencySpec::Constraint(version) => version,
            DependencySpec::Detailed { version, .. } => version,
        }
    }

    /// Optional dependencies are dropped silently when not installed
    pub fn is_optional(&self) -> bool {
        match self {
            DependencySpec::Constraint(_) => false,
            DependencySpec::Detailed { optional, .. } => *optional,
        }
    }
}

/// Locale block of a manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    /// Default locale code, must be a member of `supported`
    pub default: String,

    /// Locale codes the package ships files for
    pub supported: Vec<String>,

    /// Directory holding one file per supported code
    #[serde(default = "default_locale_dir")]
    pub dir: String,
}

fn default_locale_dir() -> String {
    "locales".to_string()
}
