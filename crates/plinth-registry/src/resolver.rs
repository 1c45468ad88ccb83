//! Dependency resolution against the installed-extension registry
//!
//! A candidate manifest's declared dependencies are checked against what
//! is currently installed and enabled. Version constraints use the
//! zero-padded comparator from `plinth_core::version`, so "1.2" and
//! "1.2.0" are the same version.

use crate::store::RecordStore;
use plinth_core::types::{DependencySpec, ExtensionRecord};
use plinth_core::{Constraint, PackageVersion, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Why a declared dependency could not be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No installed extension of that name
    Missing,
    /// Installed, but not enabled
    Disabled,
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnresolvedReason::Missing => write!(f, "missing"),
            UnresolvedReason::Disabled => write!(f, "disabled"),
        }
    }
}

/// A dependency with no usable installed provider
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedDependency {
    /// Dependency extension name
    pub name: String,

    /// Declared version constraint
    pub constraint: String,

    /// Why resolution failed
    pub reason: UnresolvedReason,
}

impl std::fmt::Display for UnresolvedDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.constraint, self.reason)
    }
}

/// An installed dependency whose version violates the declared constraint
#[derive(Debug, Clone, Serialize)]
pub struct DependencyConflict {
    /// Dependency extension name
    pub name: String,

    /// Declared version constraint
    pub constraint: String,

    /// Version currently installed
    pub installed: String,
}

impl std::fmt::Display for DependencyConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} requires {}, installed {}",
            self.name, self.constraint, self.installed
        )
    }
}

/// Outcome of resolving one manifest's declared dependencies
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    /// True only when both lists are empty
    pub can_install: bool,

    /// Dependencies that are missing or disabled
    pub unresolved: Vec<UnresolvedDependency>,

    /// Dependencies installed at a constraint-violating version
    pub conflicts: Vec<DependencyConflict>,
}

impl Resolution {
    /// Unresolved entries as display lines, for error reporting
    pub fn unresolved_lines(&self) -> Vec<String> {
        self.unresolved.iter().map(|u| u.to_string()).collect()
    }

    /// Conflict entries as display lines, for error reporting
    pub fn conflict_lines(&self) -> Vec<String> {
        self.conflicts.iter().map(|c| c.to_string()).collect()
    }
}

/// Checks declared dependencies against the record store
pub struct DependencyResolver;

impl DependencyResolver {
    /// Create a new resolver
    pub fn new() -> Self {
        Self
    }

    /// Resolve a candidate's declared dependencies.
    ///
    /// An absent optional dependency is dropped silently. A present
    /// dependency is only usable while enabled; its installed version
    /// must satisfy the declared constraint. Errors only on a constraint
    /// string that does not parse.
    pub fn resolve(
        &self,
        candidate: &str,
        dependencies: &BTreeMap<String, DependencySpec>,
        store: &RecordStore,
    ) -> Result<Resolution> {
        debug!(
            "Resolving {} dependencies for {}",
            dependencies.len(),
            candidate
        );

        let mut unresolved = Vec::new();
        let mut conflicts = Vec::new();

        for (name, spec) in dependencies {
            let constraint_text = spec.constraint().to_string();
            let constraint = Constraint::parse(&constraint_text)?;

            let installed = store.find_by_name(name);
            if installed.is_empty() {
                if spec.is_optional() {
                    debug!("Optional dependency {} not installed, skipping", name);
                    continue;
                }
                unresolved.push(UnresolvedDependency {
                    name: name.clone(),
                    constraint: constraint_text,
                    reason: UnresolvedReason::Missing,
                });
                continue;
            }

            let provider = match best_enabled(&installed) {
                Some(provider) => provider,
                None => {
                    unresolved.push(UnresolvedDependency {
                        name: name.clone(),
                        constraint: constraint_text,
                        reason: UnresolvedReason::Disabled,
                    });
                    continue;
                }
            };

            if !constraint.matches(&provider.1) {
                conflicts.push(DependencyConflict {
                    name: name.clone(),
                    constraint: constraint_text,
                    installed: provider.0.version.clone(),
                });
            }
        }

        Ok(Resolution {
            can_install: unresolved.is_empty() && conflicts.is_empty(),
            unresolved,
            conflicts,
        })
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Highest-versioned enabled record of a name, if any
fn best_enabled<'a>(
    installed: &[&'a ExtensionRecord],
) -> Option<(&'a ExtensionRecord, PackageVersion)> {
    let mut best: Option<(&ExtensionRecord, PackageVersion)> = None;
    for record in installed.iter().filter(|r| r.is_enabled) {
        let Ok(version) = PackageVersion::parse_lenient(&record.version) else {
            continue;
        };
        match &best {
            Some((_, current)) if *current >= version => {}
            _ => best = Some((record, version)),
        }
    }
    best
}
