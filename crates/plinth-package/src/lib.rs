//! # plinth-package
//!
//! Package mechanics for the Plinth extension subsystem:
//! - Archive reading and safe extraction
//! - Manifest validation (schema plus semantic rules)
//! - Security scanning of package content
//! - Quarantine storage for rejected packages
//! - Deterministic integrity hashing

pub mod archive;
pub mod integrity;
pub mod quarantine;
pub mod scanner;
pub mod validator;

pub use archive::PackageArchive;
pub use integrity::{compute_integrity_hash, verify_integrity};
pub use quarantine::{copy_dir, move_dir, QuarantineNotice, QuarantineStore};
pub use scanner::{Finding, SecurityReport, SecurityScanner, MAX_FILE_SIZE};
pub use validator::{ExtensionPackage, PackageValidator};
