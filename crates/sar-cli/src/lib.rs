//! # sar-cli: Command Line for the Simple Artefact Registry
//!
//! ## Subcommands
//!
//! - `sar serve`: run the HTTP registry.
//! - `sar artefact`: put, get, verify, list and delete against a local
//!   storage root, using the same engine as the server.
//! - `sar policy check`: print the decision the configured policy makes for
//!   a principal, operation and coordinate.
//!
//! ```bash
//! sar serve -c sar.yaml -p 9000
//! sar artefact --root ./artefacts put team-a/lib/1.0 lib.tar.gz
//! sar policy check -c sar.yaml --principal alice write team-a/lib/1.0
//! ```
//!
//! Every subcommand returns the process exit code: 0 on success, 1 when the
//! artefact is missing, corrupt, or the request would be denied.

pub mod artefact;
pub mod policy;
pub mod serve;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sar_api::config::{RegistryConfig, DEFAULT_CONFIG_FILE};

/// Load configuration from `explicit`, or from `sar.yaml` if present.
///
/// An explicitly named file must exist. When none is named and the default
/// file is absent, built-in defaults apply.
pub fn load_config(explicit: Option<&Path>) -> Result<RegistryConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                tracing::warn!(file = DEFAULT_CONFIG_FILE, "no configuration file found; using defaults");
                return Ok(RegistryConfig::default());
            }
            default
        }
    };
    let config = RegistryConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}
