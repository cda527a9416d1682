//! # sar-store: Artefact Storage Engine
//!
//! Durable, streaming storage for registry artefacts keyed by
//! [`ArtefactIdentity`](sar_core::ArtefactIdentity).
//!
//! ## On-Disk Layout
//!
//! ```text
//! {root}/tmp/{uuid}.part                      in-flight uploads
//! {root}/tmp/{uuid}.record                    record files being written
//! {root}/blobs/{uuid}                         immutable artefact bytes
//! {root}/index/{namespace}/{name}/{version}.json   committed records
//! ```
//!
//! A record file is the commit point: it names the blob holding the bytes,
//! their size and SHA-256 checksum. Publishing a new version renames a fully
//! synced record file over the old one and fsyncs the directory before the
//! superseded blob is unlinked, so readers see either the previous record or
//! the new one and never a mix.
//!
//! Startup recovery only deletes blobs it can prove unreferenced. A record
//! file that fails to parse keeps every blob on disk until it is repaired.
//!
//! ## Concurrency
//!
//! Writes to one identity serialize on a per-identity section; the last
//! committed writer wins. Streaming in either direction holds no lock.
//! The in-memory [`MetadataIndex`] is rebuilt from the record files on
//! [`ArtefactStore::open()`] and mutated only by the engine's commit and
//! delete steps.

pub mod engine;
pub mod error;
pub mod index;
mod layout;
mod locks;
pub mod reader;
pub mod record;

pub use engine::{ArtefactStore, OpenReport, VersionListing};
pub use error::StoreError;
pub use index::MetadataIndex;
pub use reader::{chunks, ArtefactReader, CHUNK_SIZE};
pub use record::ArtefactRecord;
