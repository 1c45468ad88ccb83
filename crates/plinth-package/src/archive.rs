//! Package archive reading and safe extraction
//!
//! Uploaded packages are gzip-compressed tar archives. The archive is held
//! in memory and re-read for each operation, so listing, single-file reads,
//! and extraction all work from the same bytes. Entry paths are vetted when
//! the archive is opened: absolute paths and parent-directory components are
//! rejected outright, so extraction can never escape its target directory.

use flate2::read::GzDecoder;
use plinth_core::error::{Error, Result};
use std::io::Read;
use std::path::{Component, Path};
use tar::Archive;

/// An uploaded package archive, validated as a well-formed container
#[derive(Debug, Clone)]
pub struct PackageArchive {
    bytes: Vec<u8>,
    entries: Vec<String>,
}

impl PackageArchive {
    /// Open an archive from uploaded bytes.
    ///
    /// Walks every entry once to prove the container is well formed and to
    /// cache the file listing. Unsafe entry paths fail here, before any
    /// caller gets the chance to extract.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let mut archive = Archive::new(GzDecoder::new(bytes.as_slice()));
        let mut entries = Vec::new();

        let iter = archive
            .entries()
            .map_err(|e| Error::invalid_archive(format!("not a readable archive: {}", e)))?;

        for entry in iter {
            let entry =
                entry.map_err(|e| Error::invalid_archive(format!("corrupt entry: {}", e)))?;
            let path = entry
                .path()
                .map_err(|e| Error::invalid_archive(format!("unreadable entry path: {}", e)))?;

            let normalized = normalize_entry_path(&path)?;
            if entry.header().entry_type().is_file() {
                entries.push(normalized);
            }
        }

        if entries.is_empty() {
            return Err(Error::invalid_archive("archive contains no files"));
        }

        Ok(Self { bytes, entries })
    }

    /// Relative paths of all regular files in the archive
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Whether a file exists at the given archive-relative path
    pub fn contains(&self, path: &str) -> bool {
        let wanted = path.trim_start_matches("./");
        self.entries.iter().any(|e| e == wanted)
    }

    /// Read one file's bytes out of the archive
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let wanted = path.trim_start_matches("./");
        let mut archive = Archive::new(GzDecoder::new(self.bytes.as_slice()));

        for entry in archive
            .entries()
            .map_err(|e| Error::invalid_archive(format!("not a readable archive: {}", e)))?
        {
            let mut entry =
                entry.map_err(|e| Error::invalid_archive(format!("corrupt entry: {}", e)))?;
            let entry_path = entry
                .path()
                .map_err(|e| Error::invalid_archive(format!("unreadable entry path: {}", e)))?;

            if normalize_entry_path(&entry_path)? == wanted {
                let mut buf = Vec::new();
                entry
                    .read_to_end(&mut buf)
                    .map_err(|e| Error::invalid_archive(format!("unreadable entry: {}", e)))?;
                return Ok(buf);
            }
        }

        Err(Error::invalid_archive(format!(
            "no such entry in archive: {}",
            path
        )))
    }

    /// Read one file as UTF-8 text
    pub fn read_text(&self, path: &str) -> Result<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes)
            .map_err(|_| Error::invalid_archive(format!("entry is not valid UTF-8: {}", path)))
    }

    /// Extract all files into `dest`, creating parent directories as needed.
    ///
    /// Returns the number of files written. The archive layout is preserved
    /// relative to `dest`; entry paths were already vetted at open time.
    pub fn extract_to(&self, dest: &Path) -> Result<usize> {
        std::fs::create_dir_all(dest)?;

        let mut archive = Archive::new(GzDecoder::new(self.bytes.as_slice()));
        let mut written = 0;

        for entry in archive
            .entries()
            .map_err(|e| Error::invalid_archive(format!("not a readable archive: {}", e)))?
        {
            let mut entry =
                entry.map_err(|e| Error::invalid_archive(format!("corrupt entry: {}", e)))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let entry_path = entry
                .path()
                .map_err(|e| Error::invalid_archive(format!("unreadable entry path: {}", e)))?;
            let relative = normalize_entry_path(&entry_path)?;
            let target = dest.join(&relative);

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut buf = Vec::new();
            entry
                .read_to_end(&mut buf)
                .map_err(|e| Error::invalid_archive(format!("unreadable entry: {}", e)))?;
            std::fs::write(&target, buf)?;
            written += 1;
        }

        Ok(written)
    }
}

/// Normalize a tar entry path to a safe, relative, forward-slash string.
///
/// Rejects absolute paths and any parent-directory component.
fn normalize_entry_path(path: &Path) -> Result<String> {
    let mut parts: Vec<String> = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                parts.push(part.to_string_lossy().to_string());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::invalid_archive(format!(
                    "unsafe entry path escapes archive root: {}",
                    path.display()
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::invalid_archive(format!(
                    "absolute entry path not allowed: {}",
                    path.display()
                )));
            }
        }
    }

    if parts.is_empty() {
        return Err(Error::invalid_archive("empty entry path"));
    }

    Ok(parts.join("/"))
}
