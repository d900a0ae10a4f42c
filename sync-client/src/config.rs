//! Configuration loading for ressync.
//!
//! Settings are loaded from a TOML file. Every section and field is
//! optional; missing values take the defaults below.
//!
//! ```toml
//! [connection]
//! address = "ws://127.0.0.1:9000"
//! reconnect_timeout_ms = 2000
//! max_outgoing = 10000
//! fingerprint_replies = false
//! name = "ws"
//!
//! [store]
//! path = "ressync-store.json"
//! name = "local"
//!
//! [resource]
//! update_policy = "first-settled"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ressync_core::{DEFAULT_MAX_OUTGOING, DEFAULT_RECONNECT_TIMEOUT};
use serde::Deserialize;

use crate::connection::ConnectionOptions;
use crate::resource::UpdatePolicy;

/// Root settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Connection-based backend.
    pub connection: ConnectionSettings,
    /// Persistent store backend.
    pub store: StoreSettings,
    /// Resource behaviour.
    pub resource: ResourceSettings,
}

/// Connection-based backend settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionSettings {
    /// Peer address (default: ws://127.0.0.1:9000).
    #[serde(default = "default_address")]
    pub address: String,
    /// Fixed reconnect delay in milliseconds (default: 2000).
    #[serde(default = "default_reconnect_timeout_ms")]
    pub reconnect_timeout_ms: u64,
    /// Outgoing queue capacity (default: 10000).
    #[serde(default = "default_max_outgoing")]
    pub max_outgoing: usize,
    /// Fingerprint `get`s and skip unchanged replies (default: false).
    #[serde(default)]
    pub fingerprint_replies: bool,
    /// Backend instance name (default: ws).
    #[serde(default = "default_connection_name")]
    pub name: String,
}

/// Persistent store settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoreSettings {
    /// Store file (default: ressync-store.json).
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Backend instance name, used as the key prefix (default: local).
    #[serde(default = "default_store_name")]
    pub name: String,
}

/// Resource settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResourceSettings {
    /// How multi-backend updates commit (default: first-settled).
    #[serde(default)]
    pub update_policy: UpdatePolicy,
}

// Default value functions
fn default_address() -> String {
    "ws://127.0.0.1:9000".to_string()
}

fn default_reconnect_timeout_ms() -> u64 {
    DEFAULT_RECONNECT_TIMEOUT.as_millis() as u64
}

fn default_max_outgoing() -> usize {
    DEFAULT_MAX_OUTGOING
}

fn default_connection_name() -> String {
    "ws".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("ressync-store.json")
}

fn default_store_name() -> String {
    "local".to_string()
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            reconnect_timeout_ms: default_reconnect_timeout_ms(),
            max_outgoing: default_max_outgoing(),
            fingerprint_replies: false,
            name: default_connection_name(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            name: default_store_name(),
        }
    }
}

impl ConnectionSettings {
    /// Engine options for these settings.
    pub fn options(&self) -> ConnectionOptions {
        ConnectionOptions {
            reconnect_timeout: Duration::from_millis(self.reconnect_timeout_ms),
            max_outgoing: self.max_outgoing,
            fingerprint_replies: self.fingerprint_replies,
        }
    }
}

impl Settings {
    /// Load and validate settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.reconnect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connection.reconnect_timeout_ms must be positive".into(),
            ));
        }
        if self.connection.max_outgoing == 0 {
            return Err(ConfigError::Invalid(
                "connection.max_outgoing must be positive".into(),
            ));
        }
        if self.connection.name.is_empty() {
            return Err(ConfigError::Invalid("connection.name is empty".into()));
        }
        if self.store.name.is_empty() {
            return Err(ConfigError::Invalid("store.name is empty".into()));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.connection.address, "ws://127.0.0.1:9000");
        assert_eq!(settings.connection.reconnect_timeout_ms, 2000);
        assert_eq!(settings.connection.max_outgoing, 10_000);
        assert!(!settings.connection.fingerprint_replies);
        assert_eq!(settings.store.name, "local");
        assert_eq!(settings.resource.update_policy, UpdatePolicy::FirstSettled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn settings_from_toml_string() {
        let toml = r#"
[connection]
address = "ws://peer:1234"
reconnect_timeout_ms = 500
fingerprint_replies = true

[store]
path = "/data/store.json"

[resource]
update_policy = "all"
"#;

        let settings = Settings::from_toml_str(toml).unwrap();
        assert_eq!(settings.connection.address, "ws://peer:1234");
        assert_eq!(settings.connection.max_outgoing, 10_000);
        assert_eq!(settings.store.path, PathBuf::from("/data/store.json"));
        assert_eq!(settings.store.name, "local");
        assert_eq!(settings.resource.update_policy, UpdatePolicy::All);

        let options = settings.connection.options();
        assert_eq!(options.reconnect_timeout, Duration::from_millis(500));
        assert!(options.fingerprint_replies);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = Settings::from_toml_str("[connection]\nreconnect_timeout_ms = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_queue_is_rejected() {
        let result = Settings::from_toml_str("[connection]\nmax_outgoing = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_store_name_is_rejected() {
        let result = Settings::from_toml_str("[store]\nname = \"\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let result = Settings::from_toml_str("[resource]\nupdate_policy = \"quorum\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
