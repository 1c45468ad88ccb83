//! Package version parsing and constraint evaluation
//!
//! Versions follow a three-integer `major.minor.patch` shape. Manifest
//! versions must declare all three components; constraint targets may omit
//! trailing components, which compare as zero ("1.2" compares as "1.2.0").

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed three-component package version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl PackageVersion {
    /// Create a version from explicit components
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a manifest version: exactly three dot-separated non-negative integers
    pub fn parse(version: &str) -> Result<Self> {
        let parts: Vec<&str> = version.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(Error::invalid_version(version));
        }
        Self::from_parts(&parts).ok_or_else(|| Error::invalid_version(version))
    }

    /// Parse a constraint target: one to three components, missing ones read as zero
    pub fn parse_lenient(version: &str) -> Result<Self> {
        let parts: Vec<&str> = version.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(Error::invalid_version(version));
        }
        Self::from_parts(&parts).ok_or_else(|| Error::invalid_version(version))
    }

    fn from_parts(parts: &[&str]) -> Option<Self> {
        let mut components = [0u64; 3];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            components[i] = part.parse().ok()?;
        }
        Some(Self::new(components[0], components[1], components[2]))
    }

    /// True when a version string parses with the strict three-component rule
    pub fn is_valid(version: &str) -> bool {
        Self::parse(version).is_ok()
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::str::FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A dependency version constraint: operator plus target version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Matches every installed version ("any" or "*")
    Any,
    /// Component-wise equality with the target
    Exact(PackageVersion),
    GreaterEq(PackageVersion),
    Greater(PackageVersion),
    LessEq(PackageVersion),
    Less(PackageVersion),
    /// Same major.minor as the target (`~x.y`)
    Tilde(PackageVersion),
    /// Same major as the target (`^x.y.z`)
    Caret(PackageVersion),
}

impl Constraint {
    /// Parse a constraint string such as `>=1.2.0`, `~2.1`, `^1.0.0`, `1.4.2`, or `any`
    pub fn parse(constraint: &str) -> Result<Self> {
        let trimmed = constraint.trim();
        if trimmed.is_empty() || trimmed == "any" || trimmed == "*" {
            return Ok(Self::Any);
        }

        let (op, rest) = if let Some(rest) = trimmed.strip_prefix(">=") {
            (ConstraintOp::GreaterEq, rest)
        } else if let Some(rest) = trimmed.strip_prefix("<=") {
            (ConstraintOp::LessEq, rest)
        } else if let Some(rest) = trimmed.strip_prefix('>') {
            (ConstraintOp::Greater, rest)
        } else if let Some(rest) = trimmed.strip_prefix('<') {
            (ConstraintOp::Less, rest)
        } else if let Some(rest) = trimmed.strip_prefix('~') {
            (ConstraintOp::Tilde, rest)
        } else if let Some(rest) = trimmed.strip_prefix('^') {
            (ConstraintOp::Caret, rest)
        } else {
            (ConstraintOp::Exact, trimmed)
        };

        let target = PackageVersion::parse_lenient(rest)
            .map_err(|_| Error::invalid_constraint(constraint))?;

        Ok(match op {
            ConstraintOp::Exact => Self::Exact(target),
            ConstraintOp::GreaterEq => Self::GreaterEq(target),
            ConstraintOp::Greater => Self::Greater(target),
            ConstraintOp::LessEq => Self::LessEq(target),
            ConstraintOp::Less => Self::Less(target),
            ConstraintOp::Tilde => Self::Tilde(target),
            ConstraintOp::Caret => Self::Caret(target),
        })
    }

    /// Evaluate this constraint against an installed version
    pub fn matches(&self, installed: &PackageVersion) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(target) => installed == target,
            Self::GreaterEq(target) => installed >= target,
            Self::Greater(target) => installed > target,
            Self::LessEq(target) => installed <= target,
            Self::Less(target) => installed < target,
            Self::Tilde(target) => {
                installed.major == target.major && installed.minor == target.minor
            }
            Self::Caret(target) => installed.major == target.major,
        }
    }
}

enum ConstraintOp {
    Exact,
    GreaterEq,
    Greater,
    LessEq,
    Less,
    Tilde,
    Caret,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Exact(v) => write!(f, "{}", v),
            Self::GreaterEq(v) => write!(f, ">={}", v),
            Self::Greater(v) => write!(f, ">{}", v),
            Self::LessEq(v) => write!(f, "<={}", v),
            Self::Less(v) => write!(f, "<{}", v),
            Self::Tilde(v) => write!(f, "~{}", v),
            Self::Caret(v) => write!(f, "^{}", v),
        }
    }
}

/// True when moving from `current` to `target` crosses a major version boundary.
///
/// Major bumps may be breaking; minor and patch bumps are always considered
/// safe to attempt.
pub fn is_breaking_update(current: &PackageVersion, target: &PackageVersion) -> bool {
    target.major > current.major
}
