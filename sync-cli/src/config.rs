//! Data directory layout for the CLI.
//!
//! ```text
//! <data-dir>/
//!   ressync.toml          optional settings
//!   ressync-store.json    default store file
//! ```

use anyhow::{Context, Result};
use ressync_client::{FileStore, KeyValueStore, Pipeline, Settings, StoreSync, SyncBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Settings file looked up in the data directory.
pub const SETTINGS_FILE: &str = "ressync.toml";

/// Resolved settings plus the opened store.
pub struct Workspace {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Settings in effect.
    pub settings: Settings,
    /// Where the settings came from, if not defaults.
    pub settings_path: Option<PathBuf>,
    /// Store file.
    pub store_path: PathBuf,
    store: Arc<FileStore>,
}

impl Workspace {
    /// Load settings and open the store.
    ///
    /// An explicit `config` must exist. Otherwise `<data_dir>/ressync.toml`
    /// is used when present and defaults apply when it is not.
    pub fn open(data_dir: &Path, config: Option<&Path>) -> Result<Self> {
        let candidate = data_dir.join(SETTINGS_FILE);
        let settings_path = match config {
            Some(path) => Some(path.to_path_buf()),
            None if candidate.exists() => Some(candidate),
            None => None,
        };

        let settings = match &settings_path {
            Some(path) => Settings::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };

        let store_path = if settings.store.path.is_absolute() {
            settings.store.path.clone()
        } else {
            data_dir.join(&settings.store.path)
        };
        let store = FileStore::open(&store_path)
            .with_context(|| format!("Failed to open store {}", store_path.display()))?;
        tracing::debug!(
            "workspace {} (settings: {:?})",
            data_dir.display(),
            settings_path
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            settings,
            settings_path,
            store_path,
            store: Arc::new(store),
        })
    }

    /// The raw store.
    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    /// The store as a sync backend.
    pub fn store_backend(&self) -> Arc<dyn SyncBackend> {
        Arc::new(StoreSync::with_store(
            self.settings.store.name.clone(),
            Pipeline::json(),
            self.store(),
        ))
    }
}

/// Parse a command-line value. Anything that is not JSON becomes a string.
pub fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_value_accepts_json() {
        assert_eq!(parse_value(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("true"), json!(true));
    }

    #[test]
    fn parse_value_falls_back_to_string() {
        assert_eq!(parse_value("buy milk"), json!("buy milk"));
    }

    #[test]
    fn defaults_without_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path(), None).unwrap();

        assert!(ws.settings_path.is_none());
        assert_eq!(ws.store_path, dir.path().join("ressync-store.json"));
    }

    #[test]
    fn settings_file_in_data_dir_is_used() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            "[store]\npath = \"other.json\"\nname = \"disk\"\n",
        )
        .unwrap();

        let ws = Workspace::open(dir.path(), None).unwrap();

        assert_eq!(ws.settings.store.name, "disk");
        assert_eq!(ws.store_path, dir.path().join("other.json"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Workspace::open(dir.path(), Some(&dir.path().join("nope.toml")));
        assert!(result.is_err());
    }
}
