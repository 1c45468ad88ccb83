//! Deterministic content hashing over package trees
//!
//! The integrity hash folds every file's relative path and bytes into one
//! SHA-256 accumulator, visiting files in sorted path order. Determinism
//! under directory-listing re-ordering is a required property: two scans of
//! the same tree must produce the same hash whatever order the OS returns
//! entries in.

use plinth_core::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Compute the integrity hash of all files under `package_root`.
///
/// Returns the lowercase hex SHA-256 digest.
pub fn compute_integrity_hash(package_root: &Path) -> Result<String> {
    let mut files: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(package_root).follow_links(false) {
        let entry = entry.map_err(|e| {
            Error::invalid_archive(format!(
                "failed to walk {}: {}",
                package_root.display(),
                e
            ))
        })?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(package_root)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(relative);
        }
    }

    // Sorted relative paths give one canonical visit order
    files.sort();

    let mut hasher = Sha256::new();
    for relative in &files {
        let normalized = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        hasher.update(normalized.as_bytes());
        hasher.update([0u8]);

        let bytes = std::fs::read(package_root.join(relative))?;
        hasher.update(&bytes);
    }

    let digest = hasher.finalize();
    Ok(format!("{:x}", digest))
}

/// Recompute the hash and compare against a stored value
pub fn verify_integrity(package_root: &Path, expected: &str) -> Result<bool> {
    let actual = compute_integrity_hash(package_root)?;
    Ok(actual.eq_ignore_ascii_case(expected))
}
