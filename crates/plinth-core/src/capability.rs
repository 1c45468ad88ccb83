//! Capability derivation from declared package permissions
//!
//! Loaded package code reaches host resources only through the capability
//! set built here; there is no ambient access. The default set grants
//! nothing beyond the base extension API surface. Recognized permission
//! tokens additively unlock named resource categories; dangerous or
//! unrecognized tokens are rejected when the manifest is validated, never
//! silently ignored.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Grants read access to host system information
pub const PERM_SYSTEM_ACCESS: &str = "system_access";
/// Grants outbound requests through the host fetch proxy
pub const PERM_NETWORK_ACCESS: &str = "network_access";
/// Grants the extension-scoped storage directory
pub const PERM_FILE_SYSTEM: &str = "file_system";
/// Grants the extension-scoped key/value store
pub const PERM_STORAGE_ACCESS: &str = "storage_access";
/// Grants widget slot and theming surfaces
pub const PERM_UI_ACCESS: &str = "ui_access";
/// Grants publish/subscribe on the inter-extension event bus
pub const PERM_EVENTS_ACCESS: &str = "events_access";

/// Tokens the host understands, paired with the category they unlock
const RECOGNIZED_PERMISSIONS: &[(&str, ResourceCategory)] = &[
    (PERM_SYSTEM_ACCESS, ResourceCategory::SystemInfo),
    (PERM_NETWORK_ACCESS, ResourceCategory::Network),
    (PERM_FILE_SYSTEM, ResourceCategory::FileSystem),
    (PERM_STORAGE_ACCESS, ResourceCategory::Storage),
    (PERM_UI_ACCESS, ResourceCategory::Ui),
    (PERM_EVENTS_ACCESS, ResourceCategory::Events),
];

/// Tokens that are never granted, whatever the manifest claims
const DANGEROUS_PERMISSIONS: &[&str] = &[
    "unrestricted_system",
    "process_control",
    "database_access",
    "raw_sockets",
    "native_code",
];

/// Import prefixes every extension may use without any grant
const DEFAULT_IMPORT_PREFIXES: &[&str] = &["host/api"];

/// A named host resource category an extension may be granted
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    SystemInfo,
    Network,
    FileSystem,
    Storage,
    Ui,
    Events,
}

impl ResourceCategory {
    /// Import prefix unlocked together with this category
    fn import_prefix(&self) -> &'static str {
        match self {
            ResourceCategory::SystemInfo => "host/system",
            ResourceCategory::Network => "host/net",
            ResourceCategory::FileSystem => "host/fs",
            ResourceCategory::Storage => "host/storage",
            ResourceCategory::Ui => "host/ui",
            ResourceCategory::Events => "host/events",
        }
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceCategory::SystemInfo => write!(f, "system_info"),
            ResourceCategory::Network => write!(f, "network"),
            ResourceCategory::FileSystem => write!(f, "file_system"),
            ResourceCategory::Storage => write!(f, "storage"),
            ResourceCategory::Ui => write!(f, "ui"),
            ResourceCategory::Events => write!(f, "events"),
        }
    }
}

/// The explicit, minimal set of host resources granted to one extension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Granted resource categories
    resources: BTreeSet<ResourceCategory>,

    /// Module prefixes the extension's code may import
    allowed_imports: BTreeSet<String>,
}

impl CapabilitySet {
    /// The default set: no filesystem, no network, no dynamic-code execution
    pub fn minimal() -> Self {
        let allowed_imports = DEFAULT_IMPORT_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect();
        Self {
            resources: BTreeSet::new(),
            allowed_imports,
        }
    }

    /// Whether a resource category has been granted
    pub fn allows(&self, category: ResourceCategory) -> bool {
        self.resources.contains(&category)
    }

    /// Whether a module path may be imported by extension code
    pub fn allows_import(&self, module: &str) -> bool {
        self.allowed_imports
            .iter()
            .any(|prefix| module == prefix || module.starts_with(&format!("{}/", prefix)))
    }

    /// Granted categories in stable order
    pub fn resources(&self) -> impl Iterator<Item = &ResourceCategory> {
        self.resources.iter()
    }

    fn grant(&mut self, category: ResourceCategory) {
        self.allowed_imports
            .insert(category.import_prefix().to_string());
        self.resources.insert(category);
    }
}

/// Reject dangerous and unrecognized permission tokens.
///
/// Called on the validation path so a bad manifest never reaches the
/// registry; building a capability set re-runs the same check.
pub fn vet_permissions(permissions: &[String]) -> Result<()> {
    for token in permissions {
        if DANGEROUS_PERMISSIONS.contains(&token.as_str()) {
            return Err(Error::dangerous_permission(token));
        }
        if !RECOGNIZED_PERMISSIONS
            .iter()
            .any(|(name, _)| *name == token.as_str())
        {
            return Err(Error::unknown_permission(token));
        }
    }
    Ok(())
}

/// Derive the capability set for a package's declared permissions.
///
/// Starts from [`CapabilitySet::minimal`] and additively grants the
/// category behind each recognized token.
pub fn build_capabilities(permissions: &[String]) -> Result<CapabilitySet> {
    vet_permissions(permissions)?;

    let mut set = CapabilitySet::minimal();
    for token in permissions {
        if let Some((_, category)) = RECOGNIZED_PERMISSIONS
            .iter()
            .find(|(name, _)| *name == token.as_str())
        {
            set.grant(*category);
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_minimal_set_grants_nothing() {
        let set = CapabilitySet::minimal();
        assert!(!set.allows(ResourceCategory::FileSystem));
        assert!(!set.allows(ResourceCategory::Network));
        assert!(set.allows_import("host/api"));
        assert!(set.allows_import("host/api/routes"));
        assert!(!set.allows_import("host/fs"));
        assert!(!set.allows_import("fs"));
    }

    #[test]
    fn test_recognized_tokens_unlock_categories() {
        let set = build_capabilities(&tokens(&["network_access", "file_system"])).unwrap();
        assert!(set.allows(ResourceCategory::Network));
        assert!(set.allows(ResourceCategory::FileSystem));
        assert!(!set.allows(ResourceCategory::SystemInfo));
        assert!(set.allows_import("host/net/fetch"));
        assert!(set.allows_import("host/fs"));
        assert!(!set.allows_import("host/system"));
    }

    #[test]
    fn test_dangerous_tokens_rejected() {
        let err = build_capabilities(&tokens(&["unrestricted_system"])).unwrap_err();
        assert!(matches!(
            err,
            Error::DangerousPermission { ref permission } if permission == "unrestricted_system"
        ));

        let err = vet_permissions(&tokens(&["process_control"])).unwrap_err();
        assert!(matches!(err, Error::DangerousPermission { .. }));
    }

    #[test]
    fn test_unrecognized_tokens_rejected() {
        let err = vet_permissions(&tokens(&["telepathy"])).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownPermission { ref permission } if permission == "telepathy"
        ));
    }

    #[test]
    fn test_prefix_match_does_not_leak_siblings() {
        let set = build_capabilities(&tokens(&["storage_access"])).unwrap();
        assert!(set.allows_import("host/storage"));
        assert!(set.allows_import("host/storage/kv"));
        assert!(!set.allows_import("host/storagex"));
    }

    #[test]
    fn test_grants_are_additive_and_idempotent() {
        let once = build_capabilities(&tokens(&["ui_access"])).unwrap();
        let twice = build_capabilities(&tokens(&["ui_access", "ui_access"])).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.resources().count(), 1);
    }
}
