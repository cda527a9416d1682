//! # Artefact Records
//!
//! The committed metadata for one artefact version, persisted as JSON at
//! `{root}/index/{namespace}/{name}/{version}.json`.

use chrono::{DateTime, Utc};
use sar_core::{ArtefactIdentity, ContentDigest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata for a fully written artefact version.
///
/// A record only exists once its bytes are durable; it is replaced as a
/// whole when the identity is republished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtefactRecord {
    /// The artefact coordinate.
    pub identity: ArtefactIdentity,
    /// Exact number of stored bytes.
    pub size_bytes: u64,
    /// SHA-256 of the stored bytes.
    pub checksum: ContentDigest,
    /// When the write was committed.
    pub created_at: DateTime<Utc>,
    /// Name of the immutable blob file under `{root}/blobs/`.
    pub blob: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sar_core::{digest, resolve};

    #[test]
    fn record_json_shape() {
        let record = ArtefactRecord {
            identity: resolve("ns/lib/1.0").unwrap(),
            size_bytes: 3,
            checksum: digest(b"abc"),
            created_at: Utc::now(),
            blob: Uuid::new_v4(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["identity"]["namespace"], "ns");
        assert_eq!(value["size_bytes"], 3);
        assert!(value["checksum"].as_str().unwrap().starts_with("sha256:"));

        let back: ArtefactRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn record_with_traversal_identity_is_rejected() {
        let json = serde_json::json!({
            "identity": {"namespace": "..", "name": "x", "version": "1"},
            "size_bytes": 0,
            "checksum": digest(b"").to_string(),
            "created_at": "2024-01-01T00:00:00Z",
            "blob": Uuid::nil(),
        });
        assert!(serde_json::from_value::<ArtefactRecord>(json).is_err());
    }
}
