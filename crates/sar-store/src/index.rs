//! # Metadata Index
//!
//! In-memory map from [`ArtefactIdentity`] to its committed
//! [`ArtefactRecord`]. The index is authoritative for existence checks and
//! listings while the process runs, and is reconstructed from the record
//! files under `{root}/index/` at startup.
//!
//! Every lookup reads one consistent snapshot; mutations are whole-record
//! replacements performed by the storage engine's commit and delete steps.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use sar_core::{validate_segment, ArtefactIdentity};
use uuid::Uuid;

use crate::layout::{Layout, RECORD_SUFFIX};
use crate::record::ArtefactRecord;

/// Identity → record map guarded by a synchronous read-write lock.
///
/// The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    records: RwLock<BTreeMap<ArtefactIdentity, ArtefactRecord>>,
}

impl MetadataIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for its identity, returning the previous one.
    pub(crate) fn upsert(&self, record: ArtefactRecord) -> Option<ArtefactRecord> {
        self.records.write().insert(record.identity.clone(), record)
    }

    /// Remove the record for `identity`.
    pub(crate) fn remove(&self, identity: &ArtefactIdentity) -> Option<ArtefactRecord> {
        self.records.write().remove(identity)
    }

    /// Fetch the committed record for `identity`.
    pub fn lookup(&self, identity: &ArtefactIdentity) -> Option<ArtefactRecord> {
        self.records.read().get(identity).cloned()
    }

    /// Whether a record exists for `identity`.
    pub fn contains(&self, identity: &ArtefactIdentity) -> bool {
        self.records.read().contains_key(identity)
    }

    /// The versions published under `namespace/name`, sorted.
    pub fn list_versions(&self, namespace: &str, name: &str) -> BTreeSet<String> {
        self.records
            .read()
            .keys()
            .skip_while(|id| (id.namespace(), id.name()) < (namespace, name))
            .take_while(|id| id.namespace() == namespace && id.name() == name)
            .map(|id| id.version().to_string())
            .collect()
    }

    /// Number of committed artefacts.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Blob ids referenced by at least one record.
    pub(crate) fn referenced_blobs(&self) -> HashSet<Uuid> {
        self.records.read().values().map(|r| r.blob).collect()
    }
}

/// Outcome of scanning the record files.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RebuildStats {
    pub(crate) loaded: usize,
    pub(crate) skipped: usize,
    /// Blobs named by record files that were rejected but still parsed.
    pub(crate) retained: HashSet<Uuid>,
    /// Skipped entries whose blob reference could not be read at all.
    pub(crate) unresolved: usize,
}

impl RebuildStats {
    fn skip(&mut self, rejected: Rejected) {
        self.skipped += 1;
        match rejected.blob {
            Some(blob) => {
                self.retained.insert(blob);
            }
            None => self.unresolved += 1,
        }
    }
}

/// Why a record file was not loaded, and the blob it names if it parsed.
struct Rejected {
    reason: String,
    blob: Option<Uuid>,
}

impl Rejected {
    fn unreadable(reason: impl ToString) -> Self {
        Self {
            reason: reason.to_string(),
            blob: None,
        }
    }

    fn inconsistent(reason: String, blob: Uuid) -> Self {
        Self {
            reason,
            blob: Some(blob),
        }
    }
}

/// Reconstruct the index from `{root}/index/{ns}/{name}/{version}.json`.
///
/// Entries that are misplaced, unparseable, or whose blob is missing or has
/// the wrong length are logged and skipped, as are namespace and name
/// directories that cannot be listed. Only an unreadable `index/` directory
/// fails the rebuild. Blocking; call from a blocking context.
pub(crate) fn rebuild(layout: &Layout) -> std::io::Result<(MetadataIndex, RebuildStats)> {
    let index = MetadataIndex::new();
    let mut stats = RebuildStats::default();

    let namespaces = std::fs::read_dir(layout.index_dir())?;
    for ns_dir in subdirectories(namespaces, "namespace", &mut stats) {
        let Some(names) = list_dir(&ns_dir, &mut stats) else {
            continue;
        };
        for name_dir in subdirectories(names, "name", &mut stats) {
            let Some(entries) = list_dir(&name_dir, &mut stats) else {
                continue;
            };
            for entry in entries {
                let path = match entry {
                    Ok(entry) => entry.path(),
                    Err(e) => {
                        tracing::warn!(dir = %name_dir.display(), error = %e, "skipping unreadable index entry");
                        stats.skip(Rejected::unreadable(e));
                        continue;
                    }
                };
                match load_record(layout, &path) {
                    Ok(record) => {
                        index.upsert(record);
                        stats.loaded += 1;
                    }
                    Err(rejected) => {
                        tracing::warn!(path = %path.display(), reason = %rejected.reason, "skipping index entry");
                        stats.skip(rejected);
                    }
                }
            }
        }
    }

    Ok((index, stats))
}

fn list_dir(dir: &Path, stats: &mut RebuildStats) -> Option<std::fs::ReadDir> {
    match std::fs::read_dir(dir) {
        Ok(entries) => Some(entries),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable index directory");
            stats.skip(Rejected::unreadable(e));
            None
        }
    }
}

fn subdirectories(
    entries: std::fs::ReadDir,
    component: &'static str,
    stats: &mut RebuildStats,
) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(component, error = %e, "skipping unreadable index entry");
                stats.skip(Rejected::unreadable(e));
                continue;
            }
        };
        let path = entry.path();
        let valid = entry.file_type().is_ok_and(|t| t.is_dir())
            && entry
                .file_name()
                .to_str()
                .is_some_and(|s| validate_segment(component, s).is_ok());
        if valid {
            out.push(path);
        } else {
            tracing::warn!(path = %path.display(), component, "skipping unexpected index entry");
            stats.skipped += 1;
        }
    }
    out
}

fn load_record(layout: &Layout, path: &Path) -> Result<ArtefactRecord, Rejected> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Rejected::unreadable("non UTF-8 file name"))?;
    let version = file_name
        .strip_suffix(RECORD_SUFFIX)
        .ok_or_else(|| Rejected::unreadable("not a record file"))?;
    let name = parent_name(path, 1).map_err(Rejected::unreadable)?;
    let namespace = parent_name(path, 2).map_err(Rejected::unreadable)?;
    let expected = ArtefactIdentity::new(namespace, name, version).map_err(Rejected::unreadable)?;

    let bytes = std::fs::read(path).map_err(Rejected::unreadable)?;
    let record: ArtefactRecord = serde_json::from_slice(&bytes).map_err(Rejected::unreadable)?;
    if record.identity != expected {
        return Err(Rejected::inconsistent(
            format!("record names {} but is stored at {expected}", record.identity),
            record.blob,
        ));
    }

    let blob = layout.blob_path(record.blob);
    let len = match std::fs::metadata(&blob) {
        Ok(meta) => meta.len(),
        Err(e) => {
            return Err(Rejected::inconsistent(
                format!("blob {}: {e}", record.blob),
                record.blob,
            ))
        }
    };
    if len != record.size_bytes {
        return Err(Rejected::inconsistent(
            format!(
                "blob {} holds {len} bytes, record declares {}",
                record.blob, record.size_bytes
            ),
            record.blob,
        ));
    }
    Ok(record)
}

fn parent_name(path: &Path, depth: usize) -> Result<&str, String> {
    path.ancestors()
        .nth(depth)
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("cannot read parent directory of {}", path.display()))
}
