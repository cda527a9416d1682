//! # Storage Error Types
//!
//! Structured errors for every engine operation. The engine never retries;
//! it guarantees that a failed operation left no partial state, so the
//! caller may retry safely.

use sar_core::{ArtefactIdentity, ValidationError};
use thiserror::Error;

/// Errors from the artefact storage engine.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A coordinate failed validation.
    #[error(transparent)]
    InvalidIdentity(#[from] ValidationError),

    /// No record exists for the identity.
    #[error("artefact not found: {0}")]
    NotFound(ArtefactIdentity),

    /// The streamed byte count differs from the declared size.
    #[error("size mismatch for {identity}: declared {expected} bytes, received {actual}")]
    SizeMismatch {
        /// The artefact being written.
        identity: ArtefactIdentity,
        /// Size declared by the caller.
        expected: u64,
        /// Bytes actually received (a lower bound when the upload was cut short).
        actual: u64,
    },

    /// Stored bytes no longer match the recorded checksum or size.
    #[error("corrupt artefact {identity}: {reason}")]
    CorruptArtefact {
        /// The artefact that failed verification.
        identity: ArtefactIdentity,
        /// What did not match.
        reason: String,
    },

    /// The content stream failed before the write could be committed.
    #[error("upload of {identity} interrupted: {reason}")]
    Interrupted {
        /// The artefact being written.
        identity: ArtefactIdentity,
        /// The stream error.
        reason: String,
    },

    /// I/O failure on the storage medium.
    #[error("storage unavailable ({context}): {source}")]
    StorageUnavailable {
        /// What the engine was doing.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Build a closure mapping an I/O error to [`StoreError::StorageUnavailable`].
    pub(crate) fn unavailable(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::StorageUnavailable { context, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sar_core::resolve;

    #[test]
    fn not_found_display() {
        let err = StoreError::NotFound(resolve("ns/lib/1.0").unwrap());
        assert!(format!("{err}").contains("ns/lib/1.0"));
    }

    #[test]
    fn size_mismatch_display() {
        let err = StoreError::SizeMismatch {
            identity: resolve("ns/lib/1.0").unwrap(),
            expected: 10,
            actual: 7,
        };
        let msg = format!("{err}");
        assert!(msg.contains("declared 10"));
        assert!(msg.contains("received 7"));
    }

    #[test]
    fn unavailable_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs");
        let err = StoreError::unavailable("writing blob")(io_err);
        assert!(format!("{err}").contains("writing blob"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn validation_error_converts() {
        let err: StoreError = resolve("a/b").unwrap_err().into();
        assert!(matches!(err, StoreError::InvalidIdentity(_)));
    }
}
