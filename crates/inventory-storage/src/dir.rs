use std::path::{Path, PathBuf};

use crate::{BlobStore, Result, StorageError};

/// Directory-backed [`BlobStore`]: each store name maps to `<dir>/<name>.json`.
#[derive(Clone, Debug)]
pub struct DirBlobStore {
    dir: PathBuf,
}

impl DirBlobStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !name.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl BlobStore for DirBlobStore {
    fn get(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_for(name)?;
        inventory_fs::read_to_string_if_exists(&path)
            .map_err(|source| StorageError::Io { path, source })
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        let path = self.path_for(name)?;
        inventory_fs::atomic_write_bytes(&path, value.as_bytes())
            .map_err(|source| StorageError::Io { path, source })
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        inventory_fs::remove_if_exists(&path).map_err(|source| StorageError::Io { path, source })
    }
}
