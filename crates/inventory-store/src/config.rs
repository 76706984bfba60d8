use std::path::Path;

use inventory_storage::PersistConfig;
use serde::{Deserialize, Serialize};

use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::{Result, StoreError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Undo depth. The oldest checkpoint is evicted beyond this.
    pub history_limit: usize,
    /// Key of the persisted document in the durable medium.
    pub store_name: String,
    pub persist: PersistConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            store_name: "device-storage".to_string(),
            persist: PersistConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Load a JSON config file. Missing fields take their defaults; unknown fields are rejected.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| StoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"history_limit": 5, "persist": {"save_delay_ms": 50}}"#).unwrap();

        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.store_name, "device-storage");
        assert_eq!(config.persist.save_delay, Duration::from_millis(50));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"historyLimit": 5}"#).unwrap();
        assert!(matches!(
            StoreConfig::from_json_file(&path),
            Err(StoreError::ConfigParse { .. })
        ));
    }
}
