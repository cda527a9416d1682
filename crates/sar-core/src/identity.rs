//! # Artefact Identity
//!
//! [`ArtefactIdentity`] is the `namespace/name/version` coordinate every
//! other component uses as its lookup key. It is built only through
//! [`resolve()`] or [`ArtefactIdentity::new()`].
//!
//! ## Validation
//!
//! Each segment must be:
//!
//! - non-empty and at most [`MAX_SEGMENT_LEN`] bytes,
//! - drawn from `[A-Za-z0-9._-]` (which excludes `/` and `\`),
//! - neither `.` nor `..`.
//!
//! A validated identity can therefore be joined onto a storage root without
//! escaping it.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Maximum length of a single coordinate segment, in bytes.
pub const MAX_SEGMENT_LEN: usize = 128;

/// Validate one coordinate segment.
///
/// `component` names the segment in the error ("namespace", "name",
/// "version").
pub fn validate_segment(component: &'static str, value: &str) -> Result<(), ValidationError> {
    let reject = |reason: &str| ValidationError::InvalidSegment {
        component,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(reject("must not be empty"));
    }
    if value.len() > MAX_SEGMENT_LEN {
        return Err(reject(&format!(
            "is {} bytes long (max {MAX_SEGMENT_LEN})",
            value.len()
        )));
    }
    if value == "." || value == ".." {
        return Err(reject("must not be a relative path component"));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(reject(&format!(
            "contains invalid character {c:?}: must match [A-Za-z0-9._-]"
        )));
    }
    Ok(())
}

/// A validated `namespace/name/version` artefact coordinate.
///
/// Ordered by namespace, then name, then version (plain byte order), so a
/// sorted collection of identities groups versions of the same artefact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArtefactIdentity {
    namespace: String,
    name: String,
    version: String,
}

impl ArtefactIdentity {
    /// Create an identity from its three segments, validating each.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let namespace = namespace.into();
        let name = name.into();
        let version = version.into();
        validate_segment("namespace", &namespace)?;
        validate_segment("name", &name)?;
        validate_segment("version", &version)?;
        Ok(Self {
            namespace,
            name,
            version,
        })
    }

    /// The namespace segment.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The name segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version segment.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Relative filesystem path `namespace/name/version` for this identity.
    pub fn relative_path(&self) -> PathBuf {
        Path::new(&self.namespace)
            .join(&self.name)
            .join(&self.version)
    }
}

impl Ord for ArtefactIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace
            .cmp(&other.namespace)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for ArtefactIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for ArtefactIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.name, self.version)
    }
}

impl std::str::FromStr for ArtefactIdentity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        resolve(s)
    }
}

// Deserialization re-runs validation so persisted records cannot smuggle in
// an identity that escapes the storage root.
impl<'de> Deserialize<'de> for ArtefactIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            namespace: String,
            name: String,
            version: String,
        }
        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.namespace, raw.name, raw.version).map_err(serde::de::Error::custom)
    }
}

/// Parse a raw request path into a validated identity.
///
/// Accepts `namespace/name/version`, optionally wrapped in a single leading
/// and trailing `/` as URL paths arrive. Anything else (missing or extra
/// segments, `a//b/c`, `..`, disallowed characters) is rejected.
pub fn resolve(raw_path: &str) -> Result<ArtefactIdentity, ValidationError> {
    let trimmed = raw_path.strip_prefix('/').unwrap_or(raw_path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.len() != 3 {
        return Err(ValidationError::WrongSegmentCount {
            path: raw_path.to_string(),
            segments: segments.len(),
        });
    }
    ArtefactIdentity::new(segments[0], segments[1], segments[2])
}
