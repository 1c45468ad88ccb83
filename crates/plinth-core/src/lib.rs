//! # plinth-core
//!
//! Core library for the Plinth extension subsystem providing:
//! - Manifest and registry record type definitions
//! - JSON Schema validation for manifest documents
//! - Version parsing and dependency constraint evaluation
//! - Capability derivation from declared permissions
//! - The on-disk layout shared by every component

pub mod capability;
pub mod config;
pub mod error;
pub mod schema;
pub mod types;
pub mod version;

pub use capability::{build_capabilities, vet_permissions, CapabilitySet, ResourceCategory};
pub use config::{get_home_dir, HostPaths};
pub use error::{Error, Result};
pub use schema::{SchemaValidator, MANIFEST_SCHEMA};
pub use version::{is_breaking_update, Constraint, PackageVersion};
