//! Semantic versioning parser and constraint matching
//!
//! Versions have the shape `MAJOR[.MINOR[.PATCH]][-PRERELEASE][+BUILD]`.
//! The literal `latest` is a sentinel that parses to `999.999.999`, so it
//! sorts above every ordinary release while still being compared purely on
//! the three numeric components.

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Sentinel version / constraint token
pub const LATEST: &str = "latest";

/// Numeric value used for every component of [`LATEST`]
const LATEST_COMPONENT: u64 = 999;

/// Maximum number of bytes kept from a pre-release or build tag
pub const MAX_TAG_LEN: usize = 31;

/// Errors that can occur during semver parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemverError {
    /// Invalid version format
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    /// Invalid constraint format
    #[error("Invalid constraint format: {0}")]
    InvalidConstraint(String),
}

/// Semantic version (MAJOR.MINOR.PATCH)
///
/// Equality and ordering ignore `build`.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

/// Version constraint
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Any version (`*` or `latest`)
    Any,

    /// Exact version (1.2.3); pre-release tags are not compared
    Exact(Version),

    /// Caret range (^1.2.3 → same major, at least 1.2.3)
    Caret(Version),

    /// Tilde range (~1.2.3 → same major and minor, patch at least 3)
    Tilde(Version),

    /// Greater than (>1.2.3)
    GreaterThan(Version),

    /// Greater than or equal (>=1.2.3)
    GreaterThanOrEqual(Version),

    /// Less than (<1.2.3)
    LessThan(Version),

    /// Less than or equal (<=1.2.3)
    LessThanOrEqual(Version),

    /// Wildcard pattern (1.2.x); major and minor must match, patch is free.
    /// `1.x` carries a minor of 0.
    Wildcard(u64, u64),
}

impl Version {
    /// Parse a version string
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        if s == LATEST {
            return Ok(Self::latest());
        }

        // Build metadata is split off first, then the pre-release tag
        let (rest, build) = match s.split_once('+') {
            Some((v, b)) => (v, tag(b)),
            None => (s, None),
        };

        let (core, prerelease) = match rest.split_once('-') {
            Some((v, p)) => (v, tag(p)),
            None => (rest, None),
        };

        let (major, minor, patch) = parse_core(core)
            .ok_or_else(|| SemverError::InvalidVersion(s.to_string()))?;

        Ok(Version {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }

    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// The `latest` sentinel
    pub fn latest() -> Self {
        Self::new(LATEST_COMPONENT, LATEST_COMPONENT, LATEST_COMPONENT)
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }
}

/// Parse `major[.minor[.patch]]`, ignoring anything after the last number
/// that could be read. At least the major component is required.
fn parse_core(core: &str) -> Option<(u64, u64, u64)> {
    let mut rest = core.trim_start();
    let major = take_number(&mut rest)?;
    let mut minor = 0;
    let mut patch = 0;

    if let Some(after) = rest.strip_prefix('.') {
        rest = after;
        if let Some(n) = take_number(&mut rest) {
            minor = n;
            if let Some(after) = rest.strip_prefix('.') {
                rest = after;
                if let Some(n) = take_number(&mut rest) {
                    patch = n;
                }
            }
        }
    }

    Some((major, minor, patch))
}

fn take_number(rest: &mut &str) -> Option<u64> {
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    let n = rest[..end].parse().ok()?;
    *rest = &rest[end..];
    Some(n)
}

/// Copy a tag verbatim, truncated to [`MAX_TAG_LEN`] bytes. Empty tags are absent.
fn tag(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let mut end = raw.len().min(MAX_TAG_LEN);
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    Some(raw[..end].to_string())
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.minor.cmp(&other.minor) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.patch.cmp(&other.patch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // A release supersedes its pre-releases
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.as_bytes().cmp(b.as_bytes()),
        }
    }
}

impl Constraint {
    /// Parse a constraint string
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        if s == "*" || s == LATEST {
            return Ok(Constraint::Any);
        }

        if let Some(rest) = s.strip_prefix(">=") {
            return Ok(Constraint::GreaterThanOrEqual(Version::parse(rest)?));
        }

        if let Some(rest) = s.strip_prefix("<=") {
            return Ok(Constraint::LessThanOrEqual(Version::parse(rest)?));
        }

        if let Some(rest) = s.strip_prefix('>') {
            return Ok(Constraint::GreaterThan(Version::parse(rest)?));
        }

        if let Some(rest) = s.strip_prefix('<') {
            return Ok(Constraint::LessThan(Version::parse(rest)?));
        }

        if let Some(rest) = s.strip_prefix('^') {
            return Ok(Constraint::Caret(Version::parse(rest)?));
        }

        if let Some(rest) = s.strip_prefix('~') {
            return Ok(Constraint::Tilde(Version::parse(rest)?));
        }

        if s.contains('x') || s.contains('X') {
            return Self::parse_wildcard(s);
        }

        Ok(Constraint::Exact(Version::parse(s)?))
    }

    /// Parse wildcard constraint (1.2.x, 1.x)
    fn parse_wildcard(s: &str) -> Result<Self, SemverError> {
        let pos = s
            .find('x')
            .or_else(|| s.find('X'))
            .ok_or_else(|| SemverError::InvalidConstraint(s.to_string()))?;

        let prefix = &s[..pos];
        let prefix = prefix.strip_suffix('.').unwrap_or(prefix);

        let v = Version::parse(prefix)
            .map_err(|_| SemverError::InvalidConstraint(format!("Invalid wildcard: {}", s)))?;
        Ok(Constraint::Wildcard(v.major, v.minor))
    }

    /// Check if a version satisfies this constraint
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Constraint::Any => true,

            Constraint::Exact(v) => {
                version.major == v.major && version.minor == v.minor && version.patch == v.patch
            }

            // Same-major rule applies to 0.x as well
            Constraint::Caret(v) => {
                version.major == v.major
                    && (version.minor > v.minor
                        || (version.minor == v.minor && version.patch >= v.patch))
            }

            Constraint::Tilde(v) => {
                version.major == v.major && version.minor == v.minor && version.patch >= v.patch
            }

            Constraint::GreaterThan(v) => version > v,
            Constraint::GreaterThanOrEqual(v) => version >= v,
            Constraint::LessThan(v) => version < v,
            Constraint::LessThanOrEqual(v) => version <= v,

            Constraint::Wildcard(major, minor) => {
                version.major == *major && version.minor == *minor
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Any => write!(f, "*"),
            Constraint::Exact(v) => write!(f, "{}", v),
            Constraint::Caret(v) => write!(f, "^{}", v),
            Constraint::Tilde(v) => write!(f, "~{}", v),
            Constraint::GreaterThan(v) => write!(f, ">{}", v),
            Constraint::GreaterThanOrEqual(v) => write!(f, ">={}", v),
            Constraint::LessThan(v) => write!(f, "<{}", v),
            Constraint::LessThanOrEqual(v) => write!(f, "<={}", v),
            Constraint::Wildcard(major, minor) => write!(f, "{}.{}.x", major, minor),
        }
    }
}

/// Compare two version strings.
///
/// If either side fails to parse, the raw strings are compared byte-wise.
pub fn compare(v1: &str, v2: &str) -> Ordering {
    if v1 == v2 {
        return Ordering::Equal;
    }

    match (Version::parse(v1), Version::parse(v2)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => v1.as_bytes().cmp(v2.as_bytes()),
    }
}

/// Check whether `version` satisfies `constraint`.
///
/// Unparseable input never satisfies anything except `*`, `latest`, or an
/// identical constraint string.
pub fn satisfies(version: &str, constraint: &str) -> bool {
    if constraint == "*" || constraint == LATEST || version == constraint {
        return true;
    }

    let Ok(version) = Version::parse(version) else {
        return false;
    };

    Constraint::parse(constraint)
        .map(|c| c.matches(&version))
        .unwrap_or(false)
}
