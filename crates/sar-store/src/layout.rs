//! Paths under the storage root and the staging guard for in-flight writes.

use std::path::{Path, PathBuf};

use sar_core::ArtefactIdentity;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::record::ArtefactRecord;

/// Suffix of a staged upload under `tmp/`.
const PART_SUFFIX: &str = "part";
/// Suffix of a record file being written under `tmp/`.
const RECORD_TMP_SUFFIX: &str = "record";
/// Suffix of a committed record file under `index/`.
pub(crate) const RECORD_SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub(crate) struct Layout {
    root: PathBuf,
    tmp: PathBuf,
    blobs: PathBuf,
    index: PathBuf,
}

impl Layout {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self {
            tmp: root.join("tmp"),
            blobs: root.join("blobs"),
            index: root.join("index"),
            root,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn tmp_dir(&self) -> &Path {
        &self.tmp
    }

    pub(crate) fn blobs_dir(&self) -> &Path {
        &self.blobs
    }

    pub(crate) fn index_dir(&self) -> &Path {
        &self.index
    }

    /// Create the three working directories.
    pub(crate) fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.tmp)?;
        std::fs::create_dir_all(&self.blobs)?;
        std::fs::create_dir_all(&self.index)?;
        Ok(())
    }

    pub(crate) fn blob_path(&self, blob: Uuid) -> PathBuf {
        self.blobs.join(blob.to_string())
    }

    pub(crate) fn record_path(&self, identity: &ArtefactIdentity) -> PathBuf {
        self.index
            .join(identity.namespace())
            .join(identity.name())
            .join(format!("{}{RECORD_SUFFIX}", identity.version()))
    }

    /// Create `index/{ns}/{name}` as needed, returning the directories that
    /// did not exist before, outermost first.
    async fn ensure_record_dirs(&self, identity: &ArtefactIdentity) -> std::io::Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        let mut dir = self.index.clone();
        for segment in [identity.namespace(), identity.name()] {
            dir.push(segment);
            match fs::create_dir(&dir).await {
                Ok(()) => created.push(dir.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    /// Unlink the identity's record file and fsync its directory. A record
    /// that is already gone is not an error.
    pub(crate) async fn remove_record(&self, identity: &ArtefactIdentity) -> std::io::Result<()> {
        let path = self.record_path(identity);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        }
        match path.parent() {
            Some(parent) => sync_dir(parent).await,
            None => Ok(()),
        }
    }

    fn staging_path(&self, id: Uuid, suffix: &str) -> PathBuf {
        self.tmp.join(format!("{id}.{suffix}"))
    }

    /// Durably write `record` and rename it over the identity's record file.
    ///
    /// The rename is the commit point and is fsynced before returning, along
    /// with any directories created for it. A failure before the rename
    /// removes the temp file and leaves the previous record file untouched.
    pub(crate) async fn publish_record(&self, record: &ArtefactRecord) -> Result<(), PublishError> {
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| PublishError::Aborted(std::io::Error::other(e)))?;
        let tmp = self.staging_path(Uuid::new_v4(), RECORD_TMP_SUFFIX);
        let target = self.record_path(&record.identity);

        let staged = async {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp)
                .await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            let created = self.ensure_record_dirs(&record.identity).await?;
            fs::rename(&tmp, &target).await?;
            Ok::<_, std::io::Error>(created)
        }
        .await;
        let created = match staged {
            Ok(created) => created,
            Err(e) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(PublishError::Aborted(e));
            }
        };

        let synced = async {
            for dir in &created {
                if let Some(parent) = dir.parent() {
                    sync_dir(parent).await?;
                }
            }
            match target.parent() {
                Some(parent) => sync_dir(parent).await,
                None => Ok(()),
            }
        }
        .await;
        synced.map_err(PublishError::Unsynced)
    }
}

/// How [`Layout::publish_record`] failed.
#[derive(Debug)]
pub(crate) enum PublishError {
    /// Nothing was renamed; the previous record file is in place.
    Aborted(std::io::Error),
    /// The new record file is in place but its directory was not fsynced.
    Unsynced(std::io::Error),
}

/// An upload being streamed into `tmp/`.
///
/// Dropping a `StagedBlob` that was never published deletes its file, so a
/// cancelled or failed upload leaves nothing behind.
#[derive(Debug)]
pub(crate) struct StagedBlob {
    id: Uuid,
    path: PathBuf,
    file: Option<File>,
    armed: bool,
}

impl StagedBlob {
    pub(crate) async fn create(layout: &Layout) -> std::io::Result<Self> {
        let id = Uuid::new_v4();
        let path = layout.staging_path(id, PART_SUFFIX);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(Self {
            id,
            path,
            file: Some(file),
            armed: true,
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(chunk).await,
            None => Err(std::io::Error::other("staged blob already finished")),
        }
    }

    /// Flush and fsync the staged bytes, then close the handle.
    pub(crate) async fn finish(&mut self) -> std::io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Move the staged file to its permanent blob path.
    pub(crate) async fn publish(mut self, layout: &Layout) -> std::io::Result<PathBuf> {
        let target = layout.blob_path(self.id);
        fs::rename(&self.path, &target).await?;
        self.armed = false;
        if let Err(e) = sync_dir(layout.blobs_dir()).await {
            let _ = fs::remove_file(&target).await;
            return Err(e);
        }
        Ok(target)
    }
}

/// Fsync a directory so renames and unlinks inside it survive a crash.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir).await?.sync_all().await
}

/// Directory handles cannot be fsynced here; the rename itself is all the
/// platform offers.
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        self.file.take();
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to discard staged upload");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sar_core::resolve;

    fn layout() -> (tempfile::TempDir, Layout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().to_path_buf());
        layout.ensure().unwrap();
        (dir, layout)
    }

    #[test]
    fn record_path_nests_by_coordinate() {
        let layout = Layout::new(PathBuf::from("/srv/sar"));
        let id = resolve("team-a/lib/1.2.3").unwrap();
        assert_eq!(
            layout.record_path(&id),
            PathBuf::from("/srv/sar/index/team-a/lib/1.2.3.json")
        );
    }

    #[tokio::test]
    async fn publish_record_creates_directories_and_replaces() {
        let (_dir, layout) = layout();
        let id = resolve("team-a/lib/1.0").unwrap();
        let mut record = ArtefactRecord {
            identity: id.clone(),
            size_bytes: 1,
            checksum: sar_core::digest(b"a"),
            created_at: chrono::Utc::now(),
            blob: Uuid::new_v4(),
        };
        layout.publish_record(&record).await.unwrap();
        record.blob = Uuid::new_v4();
        layout.publish_record(&record).await.unwrap();

        let stored: ArtefactRecord =
            serde_json::from_slice(&std::fs::read(layout.record_path(&id)).unwrap()).unwrap();
        assert_eq!(stored, record);
        assert_eq!(std::fs::read_dir(layout.tmp_dir()).unwrap().count(), 0);

        layout.remove_record(&id).await.unwrap();
        assert!(!layout.record_path(&id).exists());
        layout.remove_record(&id).await.unwrap();
    }

    #[tokio::test]
    async fn sync_dir_requires_existing_directory() {
        let (dir, layout) = layout();
        sync_dir(layout.blobs_dir()).await.unwrap();
        if cfg!(unix) {
            assert!(sync_dir(&dir.path().join("missing")).await.is_err());
        }
    }

    #[tokio::test]
    async fn dropped_stage_removes_file() {
        let (_dir, layout) = layout();
        let mut staged = StagedBlob::create(&layout).await.unwrap();
        staged.write(b"partial").await.unwrap();
        let path = staged.path.clone();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn published_stage_survives_drop() {
        let (_dir, layout) = layout();
        let mut staged = StagedBlob::create(&layout).await.unwrap();
        staged.write(b"complete").await.unwrap();
        staged.finish().await.unwrap();
        let id = staged.id();
        let target = staged.publish(&layout).await.unwrap();
        assert_eq!(target, layout.blob_path(id));
        assert_eq!(std::fs::read(&target).unwrap(), b"complete");
        assert_eq!(std::fs::read_dir(layout.tmp_dir()).unwrap().count(), 0);
    }
}
