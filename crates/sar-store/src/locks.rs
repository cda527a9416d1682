//! Per-identity critical sections.
//!
//! Each identity gets its own async `RwLock`, created on first use and
//! dropped from the table once no task holds or waits on it. Commits and
//! deletes take the write side; opening a blob for reading takes the read
//! side so a concurrent commit cannot unlink it between lookup and open.

use std::sync::Arc;

use dashmap::DashMap;
use sar_core::ArtefactIdentity;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type Sections = DashMap<ArtefactIdentity, Arc<RwLock<()>>>;

#[derive(Debug, Default, Clone)]
pub(crate) struct LockTable {
    sections: Arc<Sections>,
}

#[derive(Debug)]
enum Held {
    #[allow(dead_code)]
    Read(OwnedRwLockReadGuard<()>),
    #[allow(dead_code)]
    Write(OwnedRwLockWriteGuard<()>),
}

/// A held section. Releasing it prunes the table entry when unused.
#[derive(Debug)]
pub(crate) struct Section {
    held: Option<Held>,
    sections: Arc<Sections>,
    identity: ArtefactIdentity,
}

impl LockTable {
    fn handle(&self, identity: &ArtefactIdentity) -> Arc<RwLock<()>> {
        // The shard guard must not live across an await.
        Arc::clone(self.sections.entry(identity.clone()).or_default().value())
    }

    pub(crate) async fn read(&self, identity: &ArtefactIdentity) -> Section {
        let guard = self.handle(identity).read_owned().await;
        self.section(identity, Held::Read(guard))
    }

    pub(crate) async fn write(&self, identity: &ArtefactIdentity) -> Section {
        let guard = self.handle(identity).write_owned().await;
        self.section(identity, Held::Write(guard))
    }

    fn section(&self, identity: &ArtefactIdentity, held: Held) -> Section {
        Section {
            held: Some(held),
            sections: Arc::clone(&self.sections),
            identity: identity.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sections.len()
    }
}

impl Drop for Section {
    fn drop(&mut self) {
        self.held.take();
        self.sections
            .remove_if(&self.identity, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sar_core::resolve;
    use std::time::Duration;

    #[tokio::test]
    async fn entries_are_pruned_after_release() {
        let table = LockTable::default();
        let id = resolve("ns/lib/1.0").unwrap();
        {
            let _a = table.read(&id).await;
            let _b = table.read(&id).await;
            assert_eq!(table.len(), 1);
        }
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn writer_excludes_readers_on_same_identity() {
        let table = LockTable::default();
        let id = resolve("ns/lib/1.0").unwrap();
        let writer = table.write(&id).await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), table.read(&id)).await;
        assert!(blocked.is_err(), "reader must wait for the writer");

        drop(writer);
        let _reader = table.read(&id).await;
    }

    #[tokio::test]
    async fn distinct_identities_do_not_contend() {
        let table = LockTable::default();
        let a = resolve("ns/lib/1.0").unwrap();
        let b = resolve("ns/lib/2.0").unwrap();
        let _wa = table.write(&a).await;
        let wb = tokio::time::timeout(Duration::from_millis(50), table.write(&b)).await;
        assert!(wb.is_ok());
    }
}
