//! # Artefact Storage Engine
//!
//! Streams uploads into a staging file while hashing, then commits under the
//! identity's write section:
//!
//! 1. rename the staged file to `blobs/{uuid}` and fsync `blobs/`
//! 2. write the record to `tmp/`, rename it over `index/{ns}/{name}/{version}.json`
//!    and fsync that directory
//! 3. replace the in-memory index entry
//! 4. unlink the superseded blob
//!
//! Step 2 is the commit point. A failure before it removes the new blob and
//! leaves the previous version fully intact. The commit runs on its own task,
//! so once the upload's bytes are durable a caller going away cannot stop it
//! half way.
//!
//! Reads open the blob under the identity's read section and stream from the
//! open handle afterwards. Blobs are never modified in place, so an in-flight
//! read keeps returning the version it opened.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use sar_core::{digest_reader, validate_segment, ArtefactIdentity, Sha256Accumulator};
use tokio::fs::{self, File};
use tokio::io::{AsyncSeekExt, SeekFrom};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::index::{self, MetadataIndex};
use crate::layout::{Layout, PublishError, StagedBlob};
use crate::locks::LockTable;
use crate::reader::ArtefactReader;
use crate::record::ArtefactRecord;

/// What [`ArtefactStore::open_with_report()`] found and cleaned up.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OpenReport {
    /// Records loaded into the index.
    pub loaded: usize,
    /// Index entries skipped as unreadable or inconsistent.
    pub skipped: usize,
    /// Leftover staging files removed from `tmp/`.
    pub removed_partials: usize,
    /// Blobs removed because no record referenced them.
    pub removed_orphans: usize,
    /// Set when an unreadable index entry might name a blob, so no blob was
    /// treated as an orphan.
    pub orphan_sweep_skipped: bool,
}

/// The artefact storage engine. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct ArtefactStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    layout: Layout,
    index: MetadataIndex,
    locks: LockTable,
}

impl ArtefactStore {
    /// Open (or create) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self::open_with_report(root).await?.0)
    }

    /// Open a store and report what startup recovery did.
    ///
    /// Recovery discards interrupted uploads, rebuilds the index from the
    /// committed record files, and removes blobs no record references.
    pub async fn open_with_report(
        root: impl Into<PathBuf>,
    ) -> Result<(Self, OpenReport), StoreError> {
        let layout = Layout::new(root.into());
        let task_layout = layout.clone();
        let (index, report) = tokio::task::spawn_blocking(move || recover(&task_layout))
            .await
            .map_err(|e| StoreError::unavailable("startup recovery")(io::Error::other(e)))?
            .map_err(StoreError::unavailable(format!(
                "recovering store at {}",
                layout.root().display()
            )))?;

        info!(
            root = %layout.root().display(),
            loaded = report.loaded,
            skipped = report.skipped,
            removed_partials = report.removed_partials,
            removed_orphans = report.removed_orphans,
            orphan_sweep_skipped = report.orphan_sweep_skipped,
            "artefact store opened"
        );

        let store = Self {
            inner: Arc::new(Inner {
                layout,
                index,
                locks: LockTable::default(),
            }),
        };
        Ok((store, report))
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        self.inner.layout.root()
    }

    /// Read-only view of the metadata index.
    pub fn index(&self) -> &MetadataIndex {
        &self.inner.index
    }

    /// Store `content` under `identity`, replacing any previous version.
    ///
    /// When `declared_size` is given, the upload fails with
    /// [`StoreError::SizeMismatch`] as soon as the stream is known to
    /// disagree with it. A stream error fails with [`StoreError::Interrupted`].
    /// In every failure case nothing is committed and the previous version,
    /// if any, stays readable.
    pub async fn put<S>(
        &self,
        identity: &ArtefactIdentity,
        content: S,
        declared_size: Option<u64>,
    ) -> Result<ArtefactRecord, StoreError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let layout = &self.inner.layout;
        let mut staged = StagedBlob::create(layout)
            .await
            .map_err(StoreError::unavailable("creating staging file"))?;
        let mut hasher = Sha256Accumulator::new();

        futures::pin_mut!(content);
        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(|e| StoreError::Interrupted {
                identity: identity.clone(),
                reason: e.to_string(),
            })?;
            let received = hasher.len() + chunk.len() as u64;
            if let Some(expected) = declared_size {
                if received > expected {
                    return Err(StoreError::SizeMismatch {
                        identity: identity.clone(),
                        expected,
                        actual: received,
                    });
                }
            }
            hasher.update(&chunk);
            staged
                .write(&chunk)
                .await
                .map_err(StoreError::unavailable("writing staging file"))?;
        }

        let size_bytes = hasher.len();
        if let Some(expected) = declared_size {
            if size_bytes != expected {
                return Err(StoreError::SizeMismatch {
                    identity: identity.clone(),
                    expected,
                    actual: size_bytes,
                });
            }
        }
        staged
            .finish()
            .await
            .map_err(StoreError::unavailable("syncing staging file"))?;

        let record = ArtefactRecord {
            identity: identity.clone(),
            size_bytes,
            checksum: hasher.finalize(),
            created_at: Utc::now(),
            blob: staged.id(),
        };
        debug!(identity = %identity, size_bytes, "upload staged");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.commit(staged, record).await })
            .await
            .map_err(|e| StoreError::unavailable("commit task")(io::Error::other(e)))?
    }

    /// Open the artefact for streaming.
    ///
    /// Returns [`StoreError::NotFound`] when no record exists. The bytes are
    /// not re-hashed; use [`get_verified`](Self::get_verified) for that.
    pub async fn get(
        &self,
        identity: &ArtefactIdentity,
    ) -> Result<(ArtefactRecord, ArtefactReader), StoreError> {
        let (record, file) = self.open_blob(identity).await?;
        let size = record.size_bytes;
        Ok((record, ArtefactReader::new(file, size)))
    }

    /// Open the artefact after re-hashing its bytes against the record.
    ///
    /// Fails with [`StoreError::CorruptArtefact`] if the blob's checksum or
    /// length no longer matches.
    pub async fn get_verified(
        &self,
        identity: &ArtefactIdentity,
    ) -> Result<(ArtefactRecord, ArtefactReader), StoreError> {
        let (record, mut file) = self.open_blob(identity).await?;

        let (actual, len) = digest_reader(&mut file)
            .await
            .map_err(StoreError::unavailable(format!("verifying {identity}")))?;
        if len != record.size_bytes {
            warn!(identity = %identity, expected = record.size_bytes, actual = len, "stored size mismatch");
            return Err(StoreError::CorruptArtefact {
                identity: identity.clone(),
                reason: format!("expected {} bytes, found {len}", record.size_bytes),
            });
        }
        if !actual.ct_eq(&record.checksum) {
            warn!(identity = %identity, expected = %record.checksum, %actual, "stored checksum mismatch");
            return Err(StoreError::CorruptArtefact {
                identity: identity.clone(),
                reason: format!("expected {}, found {actual}", record.checksum),
            });
        }

        file.seek(SeekFrom::Start(0))
            .await
            .map_err(StoreError::unavailable(format!("rewinding {identity}")))?;
        let size = record.size_bytes;
        Ok((record, ArtefactReader::new(file, size)))
    }

    /// Whether a committed record exists for `identity`.
    pub fn exists(&self, identity: &ArtefactIdentity) -> bool {
        self.inner.index.contains(identity)
    }

    /// The committed record for `identity`, without opening its bytes.
    pub fn lookup(&self, identity: &ArtefactIdentity) -> Result<ArtefactRecord, StoreError> {
        self.inner
            .index
            .lookup(identity)
            .ok_or_else(|| StoreError::NotFound(identity.clone()))
    }

    /// Versions published under `namespace/name`.
    pub fn list(&self, namespace: &str, name: &str) -> Result<VersionListing, StoreError> {
        validate_segment("namespace", namespace)?;
        validate_segment("name", name)?;
        Ok(VersionListing {
            inner: Arc::clone(&self.inner),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Remove `identity`. Readers that already opened it finish normally.
    pub async fn delete(&self, identity: &ArtefactIdentity) -> Result<ArtefactRecord, StoreError> {
        let inner = Arc::clone(&self.inner);
        let identity = identity.clone();
        tokio::spawn(async move { inner.remove(identity).await })
            .await
            .map_err(|e| StoreError::unavailable("delete task")(io::Error::other(e)))?
    }

    async fn open_blob(
        &self,
        identity: &ArtefactIdentity,
    ) -> Result<(ArtefactRecord, File), StoreError> {
        let _section = self.inner.locks.read(identity).await;
        let record = self.lookup(identity)?;
        let path = self.inner.layout.blob_path(record.blob);
        match File::open(&path).await {
            Ok(file) => Ok((record, file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(identity = %identity, blob = %record.blob, "blob missing for committed record");
                Err(StoreError::CorruptArtefact {
                    identity: identity.clone(),
                    reason: format!("blob {} is missing", record.blob),
                })
            }
            Err(e) => Err(StoreError::unavailable(format!("opening {identity}"))(e)),
        }
    }
}

impl Inner {
    async fn commit(&self, staged: StagedBlob, record: ArtefactRecord) -> Result<ArtefactRecord, StoreError> {
        let section = self.locks.write(&record.identity).await;

        let blob_path = staged
            .publish(&self.layout)
            .await
            .map_err(StoreError::unavailable("publishing blob"))?;

        match self.layout.publish_record(&record).await {
            Ok(()) => {}
            Err(PublishError::Aborted(e)) => {
                discard_blob(&blob_path).await;
                return Err(StoreError::unavailable(format!("writing record for {}", record.identity))(e));
            }
            Err(PublishError::Unsynced(e)) => {
                // The new record is on disk, so the index follows it. The
                // superseded blob stays until the next open sweeps it.
                self.index.upsert(record.clone());
                return Err(StoreError::unavailable(format!("syncing record for {}", record.identity))(e));
            }
        }

        let previous = self.index.upsert(record.clone());
        drop(section);

        if let Some(previous) = previous {
            discard_blob(&self.layout.blob_path(previous.blob)).await;
        }
        info!(
            identity = %record.identity,
            size_bytes = record.size_bytes,
            checksum = %record.checksum,
            "artefact committed"
        );
        Ok(record)
    }

    async fn remove(&self, identity: ArtefactIdentity) -> Result<ArtefactRecord, StoreError> {
        let section = self.locks.write(&identity).await;
        let record = self
            .index
            .lookup(&identity)
            .ok_or_else(|| StoreError::NotFound(identity.clone()))?;

        self.layout
            .remove_record(&identity)
            .await
            .map_err(StoreError::unavailable(format!("removing record for {identity}")))?;
        self.index.remove(&identity);
        drop(section);

        discard_blob(&self.layout.blob_path(record.blob)).await;
        info!(identity = %identity, "artefact deleted");
        Ok(record)
    }
}

/// Best-effort unlink. A blob left behind is swept on the next open.
async fn discard_blob(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove blob");
        }
    }
}

/// Versions under one `namespace/name`. Each call to
/// [`iter`](Self::iter) reads the index afresh.
#[derive(Debug, Clone)]
pub struct VersionListing {
    inner: Arc<Inner>,
    namespace: String,
    name: String,
}

impl VersionListing {
    /// Iterate versions in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = String> {
        self.inner
            .index
            .list_versions(&self.namespace, &self.name)
            .into_iter()
    }

    /// The namespace being listed.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The artefact name being listed.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn recover(layout: &Layout) -> io::Result<(MetadataIndex, OpenReport)> {
    layout.ensure()?;
    let mut report = OpenReport::default();

    for entry in std::fs::read_dir(layout.tmp_dir())? {
        let path = entry?.path();
        match std::fs::remove_file(&path) {
            Ok(()) => report.removed_partials += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staging file"),
        }
    }

    let (index, stats) = index::rebuild(layout)?;
    report.loaded = stats.loaded;
    report.skipped = stats.skipped;

    if stats.unresolved > 0 {
        warn!(
            unresolved = stats.unresolved,
            "index entries could not be read; keeping all unreferenced blobs"
        );
        report.orphan_sweep_skipped = true;
        return Ok((index, report));
    }

    let mut keep = index.referenced_blobs();
    keep.extend(stats.retained);
    for entry in std::fs::read_dir(layout.blobs_dir())? {
        let path = entry?.path();
        let id = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| Uuid::parse_str(n).ok());
        match id {
            Some(id) if keep.contains(&id) => {}
            Some(_) => match std::fs::remove_file(&path) {
                Ok(()) => report.removed_orphans += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove orphan blob"),
            },
            None => warn!(path = %path.display(), "ignoring unrecognised file in blob directory"),
        }
    }

    Ok((index, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sar_core::{digest, resolve};

    fn body(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> + Send {
        futures::stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    async fn store() -> (tempfile::TempDir, ArtefactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtefactStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_get() {
        let (_dir, store) = store().await;
        let id = resolve("ns/lib/1.0").unwrap();
        let record = store.put(&id, body(b"hello"), Some(5)).await.unwrap();
        assert_eq!(record.size_bytes, 5);
        assert_eq!(record.checksum, digest(b"hello"));

        let (got, reader) = store.get(&id).await.unwrap();
        assert_eq!(got, record);
        assert_eq!(reader.read_to_vec().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn put_without_declared_size() {
        let (_dir, store) = store().await;
        let id = resolve("ns/lib/1.0").unwrap();
        let record = store.put(&id, body(b"abc"), None).await.unwrap();
        assert_eq!(record.size_bytes, 3);
    }

    #[tokio::test]
    async fn empty_artefact_is_valid() {
        let (_dir, store) = store().await;
        let id = resolve("ns/lib/empty").unwrap();
        let record = store
            .put(&id, futures::stream::empty(), Some(0))
            .await
            .unwrap();
        assert_eq!(record.checksum, digest(b""));
        let (_, reader) = store.get_verified(&id).await.unwrap();
        assert!(reader.read_to_vec().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_upload_is_size_mismatch() {
        let (_dir, store) = store().await;
        let id = resolve("ns/lib/1.0").unwrap();
        let err = store.put(&id, body(b"abc"), Some(10)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::SizeMismatch { expected: 10, actual: 3, .. }
        ));
        assert!(!store.exists(&id));
    }

    #[tokio::test]
    async fn oversized_upload_stops_early() {
        let (_dir, store) = store().await;
        let id = resolve("ns/lib/1.0").unwrap();
        let err = store.put(&id, body(b"abcdef"), Some(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::SizeMismatch { expected: 2, .. }));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_dir, store) = store().await;
        let id = resolve("ns/lib/1.0").unwrap();
        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.lookup(&id), Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn overwrite_replaces_blob() {
        let (dir, store) = store().await;
        let id = resolve("ns/lib/1.0").unwrap();
        let first = store.put(&id, body(b"one"), None).await.unwrap();
        let second = store.put(&id, body(b"two!"), None).await.unwrap();
        assert_ne!(first.blob, second.blob);
        assert!(!dir.path().join("blobs").join(first.blob.to_string()).exists());

        let (_, reader) = store.get(&id).await.unwrap();
        assert_eq!(reader.read_to_vec().await.unwrap(), b"two!");
    }

    #[tokio::test]
    async fn list_rejects_bad_segments() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.list("..", "lib"),
            Err(StoreError::InvalidIdentity(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_record_and_blob() {
        let (dir, store) = store().await;
        let id = resolve("ns/lib/1.0").unwrap();
        let record = store.put(&id, body(b"bye"), None).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id));
        assert!(!dir.path().join("index/ns/lib/1.0.json").exists());
        assert!(!dir.path().join("blobs").join(record.blob.to_string()).exists());
        assert!(matches!(store.delete(&id).await, Err(StoreError::NotFound(_))));
    }
}
