#![deny(missing_docs)]

//! # sar-core: Foundational Types for the Simple Artefact Registry
//!
//! This crate defines the types every other crate in the workspace shares.
//! It has no internal crate dependencies.
//!
//! ## Design Principles
//!
//! 1. **Validated identities.** An [`ArtefactIdentity`] can only be built
//!    through [`resolve()`] or [`ArtefactIdentity::new()`], both of which
//!    reject path traversal and characters outside `[A-Za-z0-9._-]`. Code that
//!    holds an identity can join it onto a storage root without re-checking.
//!
//! 2. **Streaming digests.** [`Sha256Accumulator`] and [`digest_reader()`]
//!    compute a [`ContentDigest`] chunk by chunk so that artefacts never need
//!    to be held in memory.
//!
//! 3. **Structured errors.** [`ValidationError`] carries the offending input
//!    so operators can diagnose bad coordinates without guesswork.

pub mod digest;
pub mod error;
pub mod identity;

// Re-export primary types at crate root for ergonomic imports.
pub use digest::{
    digest, digest_reader, verify, ContentDigest, DigestAlgorithm, Sha256Accumulator,
};
pub use error::ValidationError;
pub use identity::{resolve, validate_segment, ArtefactIdentity, MAX_SEGMENT_LEN};
