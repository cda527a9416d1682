//! # Registry Configuration
//!
//! YAML configuration for the registry process. Every section is optional:
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8080
//! storage:
//!   root: ./artefacts
//! authorization:
//!   enabled: true
//!   principals:
//!     - {id: alice, token: alice-secret, claims: {team: a}}
//!   rules:
//!     - {pattern: "team-a/*", operation: write, principal: {id: alice}, effect: allow}
//! ```
//!
//! `Debug` output never includes principal tokens.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use sar_policy::{AuthorizationConfig, LoadedAuthorization, PolicyConfigurationError};
use serde::Deserialize;
use thiserror::Error;

/// Default configuration file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sar.yaml";

/// Errors loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Policy(#[from] PolicyConfigurationError),

    #[error("invalid listen address {host}:{port}")]
    Address { host: String, port: u16 },
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_root() -> PathBuf {
    PathBuf::from("artefacts")
}

impl RegistryConfig {
    /// Read and parse `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse configuration text. An empty document yields the defaults.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Validate the authorization section into a policy and credentials.
    pub fn authorization(&self) -> Result<LoadedAuthorization, ConfigError> {
        Ok(self.authorization.load()?)
    }

    /// The address to listen on. `host` may be an IP address or a name.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        (self.server.host.as_str(), self.server.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::Address {
                host: self.server.host.clone(),
                port: self.server.port,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = RegistryConfig::from_yaml("").unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.storage.root, PathBuf::from("artefacts"));
        assert!(!cfg.authorization.enabled);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let cfg = RegistryConfig::from_yaml("server:\n  port: 9000\n").unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.listen_addr().unwrap().to_string(), "0.0.0.0:9000");
    }

    #[test]
    fn full_document() {
        let cfg = RegistryConfig::from_yaml(
            r#"
server: {host: 127.0.0.1, port: 8181}
storage: {root: /var/lib/sar}
authorization:
  enabled: true
  principals:
    - {id: alice, token: s3cret}
  rules:
    - {pattern: "team-a/*", operation: write, principal: {id: alice}, effect: allow}
"#,
        )
        .unwrap();
        assert_eq!(cfg.storage.root, PathBuf::from("/var/lib/sar"));
        let auth = cfg.authorization().unwrap();
        assert!(auth.policy.is_enabled());
        assert_eq!(auth.credentials.len(), 1);
        assert!(!format!("{cfg:?}").contains("s3cret"));
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(matches!(
            RegistryConfig::from_yaml("servr: {}\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn policy_errors_surface() {
        let cfg = RegistryConfig::from_yaml(
            "authorization:\n  rules:\n    - {pattern: x, operation: erase, effect: allow}\n",
        )
        .unwrap();
        assert!(matches!(cfg.authorization(), Err(ConfigError::Policy(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RegistryConfig::load(Path::new("/nonexistent/sar.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(format!("{err}").contains("/nonexistent/sar.yaml"));
    }
}
