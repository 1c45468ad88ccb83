//! Security screening of extracted package content
//!
//! Per-file checks: allow-listed extensions, a size ceiling, and source
//! pattern screening for script and markup files. Pattern screening is a
//! best-effort pre-filter layered in front of the capability boundary, not
//! the sole defense.

use plinth_core::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Largest file a package may carry (bytes)
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// File extensions a package may contain
const ALLOWED_EXTENSIONS: &[&str] = &[
    // Script
    "js", "mjs", "cjs", "ts", "vue",
    // Markup and style
    "html", "htm", "css", "scss",
    // Structured data
    "json", "yaml", "yml",
    // Documentation
    "md", "txt",
    // Images
    "png", "jpg", "jpeg", "gif", "svg", "webp", "ico",
];

/// Extensions whose content gets pattern-screened
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "vue", "html", "htm"];

/// Disallowed source patterns. A match anywhere in a screened file is a
/// critical finding.
const BLOCKED_PATTERNS: &[(&str, &str)] = &[
    (
        "parent-directory import",
        r#"(?:require\s*\(\s*|from\s+|import\s*\(\s*)["']\.\.[/\\]"#,
    ),
    ("ambient environment access", r"\bprocess\.env\b"),
    ("cookie access", r"\bdocument\.cookie\b"),
    ("location manipulation", r"\bwindow\.location\b"),
    ("dynamic code evaluation", r"\beval\s*\("),
    ("dynamic code evaluation", r"\bnew\s+Function\s*\("),
    ("process spawning", r"\bchild_process\b"),
    (
        "raw network primitive",
        r"\bnet\.(?:createServer|createConnection|Socket)\b",
    ),
    ("raw network primitive", r"\bdgram\.createSocket\b"),
];

/// Compiled screening patterns, built once
fn blocked_patterns() -> &'static Vec<(&'static str, regex::Regex)> {
    static PATTERNS: OnceLock<Vec<(&'static str, regex::Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        BLOCKED_PATTERNS
            .iter()
            .map(|(label, pattern)| {
                let regex = regex::Regex::new(pattern)
                    .expect("built-in screening pattern must compile");
                (*label, regex)
            })
            .collect()
    })
}

/// One problem found in one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Path relative to the package root
    pub file: PathBuf,
    /// What was found
    pub detail: String,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.detail)
    }
}

/// Outcome of one scan pass over a package root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Findings that block installation
    pub critical: Vec<Finding>,

    /// Recorded but non-blocking findings
    pub warnings: Vec<Finding>,

    /// Files that passed every check
    pub passed: Vec<PathBuf>,
}

impl SecurityReport {
    /// Whether any finding blocks installation
    pub fn has_critical(&self) -> bool {
        !self.critical.is_empty()
    }

    /// Whether the scan produced no findings at all
    pub fn is_clean(&self) -> bool {
        self.critical.is_empty() && self.warnings.is_empty()
    }

    /// One-line summary for record bookkeeping and logs
    pub fn summary(&self) -> String {
        if self.has_critical() {
            let details: Vec<String> = self.critical.iter().map(|f| f.to_string()).collect();
            format!(
                "{} critical finding(s): {}",
                self.critical.len(),
                details.join("; ")
            )
        } else if !self.warnings.is_empty() {
            format!(
                "{} warning(s), {} file(s) passed",
                self.warnings.len(),
                self.passed.len()
            )
        } else {
            format!("{} file(s) passed", self.passed.len())
        }
    }
}

/// Screens package files for disallowed types, sizes, and source patterns
#[derive(Debug, Clone)]
pub struct SecurityScanner {
    max_file_size: u64,
}

impl Default for SecurityScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityScanner {
    /// Create a scanner with the default size ceiling
    pub fn new() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
        }
    }

    /// Override the size ceiling
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Scan every file under `package_root`.
    ///
    /// Files are visited in sorted order so reports are stable across
    /// directory-listing order.
    pub fn scan(&self, package_root: &Path) -> Result<SecurityReport> {
        let mut report = SecurityReport::default();

        for entry in WalkDir::new(package_root)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                plinth_core::Error::invalid_archive(format!("failed to walk package: {}", e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(package_root)
                .unwrap_or(entry.path())
                .to_path_buf();

            self.scan_file(entry.path(), relative, &mut report)?;
        }

        debug!(
            "Scan complete: {} critical, {} warnings, {} passed",
            report.critical.len(),
            report.warnings.len(),
            report.passed.len()
        );

        Ok(report)
    }

    fn scan_file(&self, path: &Path, relative: PathBuf, report: &mut SecurityReport) -> Result<()> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let extension = match extension {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => ext,
            Some(ext) => {
                report.warnings.push(Finding {
                    file: relative,
                    detail: format!("disallowed file type: .{}", ext),
                });
                return Ok(());
            }
            None => {
                report.warnings.push(Finding {
                    file: relative,
                    detail: "file has no extension".to_string(),
                });
                return Ok(());
            }
        };

        let size = std::fs::metadata(path)?.len();
        if size > self.max_file_size {
            report.critical.push(Finding {
                file: relative,
                detail: format!("file size {} exceeds limit {}", size, self.max_file_size),
            });
            return Ok(());
        }

        if SCRIPT_EXTENSIONS.contains(&extension.as_str()) {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(_) => {
                    warn!("Undecodable script content: {:?}", relative);
                    report.warnings.push(Finding {
                        file: relative,
                        detail: "content is not valid UTF-8".to_string(),
                    });
                    return Ok(());
                }
            };

            let mut matched = false;
            for (label, pattern) in blocked_patterns() {
                if pattern.is_match(&content) {
                    report.critical.push(Finding {
                        file: relative.clone(),
                        detail: format!("disallowed pattern: {}", label),
                    });
                    matched = true;
                }
            }
            if matched {
                return Ok(());
            }
        }

        report.passed.push(relative);
        Ok(())
    }
}
