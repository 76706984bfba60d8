use std::collections::HashMap;
use std::sync::Mutex;

use crate::Result;

/// A medium holding one serialized JSON document per store name.
///
/// Calls are blocking; async callers go through `spawn_blocking`.
pub trait BlobStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<String>>;
    fn set(&self, name: &str, value: &str) -> Result<()>;
    fn delete(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("memory store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, name: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().expect("memory store mutex poisoned");
        Ok(entries.get(name).cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("memory store mutex poisoned");
        entries.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("memory store mutex poisoned");
        entries.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_get_set_delete() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.get("device-storage").unwrap(), None);
        store.set("device-storage", "{}").unwrap();
        store.set("device-storage", "{\"version\":1}").unwrap();
        assert_eq!(
            store.get("device-storage").unwrap().as_deref(),
            Some("{\"version\":1}")
        );
        assert_eq!(store.len(), 1);
        store.delete("device-storage").unwrap();
        store.delete("device-storage").unwrap();
        assert!(store.is_empty());
    }
}
