//! # API Route Modules
//!
//! - `artefacts`: upload, download, delete and version listing under
//!   `/artefacts/{namespace}/{name}[/{version}]`.

pub mod artefacts;
