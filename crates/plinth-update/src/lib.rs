//! # plinth-update
//!
//! Background update orchestration for installed extensions:
//! - Package sources that fetch versioned archives over HTTP or from a
//!   local directory
//! - Timestamped backups of the current install before any swap
//! - A serialized worker that fetches, validates, swaps, migrates, and
//!   enables the target version, rolling back to the backup on failure

pub mod backup;
pub mod job;
pub mod orchestrator;
pub mod source;

pub use backup::BackupManager;
pub use job::{UpdateJob, UpdateOutcome, UpdateStatus};
pub use orchestrator::UpdateOrchestrator;
pub use source::{DirectorySource, HttpPackageSource, PackageSource};
