//! # Error Hierarchy
//!
//! Validation errors for the registry's domain primitives, built with
//! `thiserror`. Each variant carries the rejected input and the reason so
//! that a 400 response can tell the client exactly what was wrong.

use thiserror::Error;

/// Validation errors for artefact coordinates and digests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The raw path does not split into exactly namespace/name/version.
    #[error("invalid artefact identity \"{path}\": expected namespace/name/version, got {segments} segment(s)")]
    WrongSegmentCount {
        /// The raw path as received.
        path: String,
        /// How many segments it split into.
        segments: usize,
    },

    /// A single coordinate segment failed validation.
    #[error("invalid artefact identity: {component} \"{value}\" {reason}")]
    InvalidSegment {
        /// Which component was rejected ("namespace", "name", "version").
        component: &'static str,
        /// The rejected segment.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A digest string is not `sha256:<64 hex chars>`.
    #[error("invalid content digest \"{0}\" (expected sha256:<64 hex characters>)")]
    InvalidDigest(String),
}

impl ValidationError {
    /// Whether this error concerns an artefact coordinate (as opposed to a digest).
    pub fn is_invalid_identity(&self) -> bool {
        matches!(
            self,
            Self::WrongSegmentCount { .. } | Self::InvalidSegment { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_segment_count_display() {
        let err = ValidationError::WrongSegmentCount {
            path: "a/b".to_string(),
            segments: 2,
        };
        let msg = format!("{err}");
        assert!(msg.contains("a/b"));
        assert!(msg.contains("2 segment"));
    }

    #[test]
    fn invalid_segment_display() {
        let err = ValidationError::InvalidSegment {
            component: "version",
            value: "..".to_string(),
            reason: "must not be a relative path component".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("version"));
        assert!(msg.contains(".."));
    }

    #[test]
    fn invalid_digest_is_not_identity_error() {
        let err = ValidationError::InvalidDigest("md5:abc".to_string());
        assert!(!err.is_invalid_identity());
        assert!(format!("{err}").contains("md5:abc"));
    }
}
