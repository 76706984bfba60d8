use std::sync::Arc;

use inventory_storage::{BlobStore, PersistWriter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{Action, DeviceCollection, Effect, StateCore};

/// Version tag of the persisted envelope.
pub const PERSIST_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    state: &'a DeviceCollection,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    state: DeviceCollection,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed state document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported state version {0}")]
    Version(u32),
}

/// `{"version": 1, "state": {"devices": [...], "defaultVisibleSheets": [...]}}`
pub fn encode_state(state: &DeviceCollection) -> serde_json::Result<String> {
    serde_json::to_string(&EnvelopeRef {
        version: PERSIST_VERSION,
        state,
    })
}

pub fn decode_state(text: &str) -> Result<DeviceCollection, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if envelope.version != PERSIST_VERSION {
        return Err(DecodeError::Version(envelope.version));
    }
    Ok(envelope.state)
}

/// Load the persisted collection. Missing, unreadable or malformed documents yield an empty
/// collection.
pub async fn rehydrate(store: Arc<dyn BlobStore>, store_name: &str) -> DeviceCollection {
    let name = store_name.to_string();
    let loaded = tokio::task::spawn_blocking(move || store.get(&name)).await;
    let text = match loaded {
        Ok(Ok(Some(text))) => text,
        Ok(Ok(None)) => {
            log::info!("no persisted state under {store_name:?}; starting empty");
            return DeviceCollection::default();
        }
        Ok(Err(err)) => {
            log::warn!("failed to read persisted state {store_name:?}: {err}; starting empty");
            return DeviceCollection::default();
        }
        Err(err) => {
            log::warn!("rehydration task failed: {err}; starting empty");
            return DeviceCollection::default();
        }
    };
    match decode_state(&text) {
        Ok(state) => {
            log::info!("rehydrated {} devices from {store_name:?}", state.len());
            state
        }
        Err(err) => {
            log::warn!("discarding persisted state {store_name:?}: {err}");
            DeviceCollection::default()
        }
    }
}

/// Writes every new state of the wrapped layer to the durable medium.
///
/// The write is queued on the [`PersistWriter`]; the in-memory state is visible immediately and
/// no JSON is produced on the caller's path.
/// Failures to queue are kept as warnings for the owner to surface.
pub struct Persisted<S> {
    inner: S,
    writer: Arc<PersistWriter>,
    store_name: String,
    warnings: Vec<String>,
}

impl<S: StateCore> Persisted<S> {
    pub fn new(inner: S, writer: Arc<PersistWriter>, store_name: impl Into<String>) -> Self {
        Self {
            inner,
            writer,
            store_name: store_name.into(),
            warnings: Vec::new(),
        }
    }

    pub fn writer(&self) -> &Arc<PersistWriter> {
        &self.writer
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Hands the writer a snapshot sharing every device with the live state. Encoding happens
    /// in the writer, once for the last snapshot of each save window.
    fn persist(&mut self) {
        let snapshot = self.inner.state().clone();
        let queued = self.writer.write_with(self.store_name.clone(), move || {
            encode_state(&snapshot).map_err(|e| e.to_string())
        });
        if let Err(err) = queued {
            log::warn!("failed to queue persistence of {:?}: {err}", self.store_name);
            self.warnings.push(err.to_string());
        }
    }
}

impl<S: StateCore> StateCore for Persisted<S> {
    fn state(&self) -> &DeviceCollection {
        self.inner.state()
    }

    fn dispatch(&mut self, action: Action) -> Option<Effect> {
        let effect = self.inner.dispatch(action)?;
        self.persist();
        Some(effect)
    }

    fn replace(&mut self, state: DeviceCollection) {
        self.inner.replace(state);
        self.persist();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_storage::{MemoryBlobStore, PersistConfig};

    #[test]
    fn envelope_shape() {
        let state = DeviceCollection {
            devices: Vec::new(),
            default_visible_sheets: vec!["license".into()],
        };
        let json: serde_json::Value = serde_json::from_str(&encode_state(&state).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "version": 1,
                "state": { "devices": [], "defaultVisibleSheets": ["license"] }
            })
        );
        assert_eq!(decode_state(&json.to_string()).unwrap(), state);
    }

    #[test]
    fn other_versions_are_rejected() {
        let err = decode_state(r#"{"version": 2, "state": {"devices": []}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Version(2)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn every_change_is_written_and_no_ops_are_not() {
        let blob = Arc::new(MemoryBlobStore::new());
        let writer = Arc::new(PersistWriter::spawn(blob.clone(), PersistConfig::default()));
        let mut layer = Persisted::new(DeviceCollection::default(), writer.clone(), "device-storage");

        layer.dispatch(Action::Remove("missing".into()));
        writer.flush().await.unwrap();
        assert_eq!(blob.get("device-storage").unwrap(), None);

        layer.dispatch(Action::SetDefaultVisibleSheets(vec!["cau_hinh".into()]));
        writer.flush().await.unwrap();
        let restored = rehydrate(blob.clone(), "device-storage").await;
        assert_eq!(restored.default_visible_sheets, vec!["cau_hinh"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn changes_in_one_window_are_written_once_with_the_latest_state() {
        let blob = Arc::new(MemoryBlobStore::new());
        let writer = Arc::new(PersistWriter::spawn(blob.clone(), PersistConfig::default()));
        let mut layer = Persisted::new(DeviceCollection::default(), writer.clone(), "device-storage");

        for sheet in ["cau_hinh", "license", "software"] {
            layer.dispatch(Action::SetDefaultVisibleSheets(vec![sheet.into()]));
        }
        assert_eq!(blob.get("device-storage").unwrap(), None);
        writer.flush().await.unwrap();

        assert_eq!(writer.save_count(), 1);
        let restored = rehydrate(blob.clone(), "device-storage").await;
        assert_eq!(restored.default_visible_sheets, vec!["software"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn corrupt_documents_rehydrate_empty() {
        let blob = Arc::new(MemoryBlobStore::new());
        blob.set("device-storage", "{not json").unwrap();
        assert!(rehydrate(blob, "device-storage").await.is_empty());
    }
}
