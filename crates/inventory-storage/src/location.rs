use std::path::PathBuf;
use std::sync::Arc;

use crate::{BlobStore, DirBlobStore, MemoryBlobStore, Result, SqliteBlobStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceLocation {
    InMemory,
    /// SQLite database file.
    Sqlite(PathBuf),
    /// Directory of `<name>.json` documents.
    Directory(PathBuf),
}

pub fn open_blob_store(location: &PersistenceLocation) -> Result<Arc<dyn BlobStore>> {
    Ok(match location {
        PersistenceLocation::InMemory => Arc::new(MemoryBlobStore::new()),
        PersistenceLocation::Sqlite(path) => Arc::new(SqliteBlobStore::open_path(path)?),
        PersistenceLocation::Directory(dir) => Arc::new(DirBlobStore::open(dir.clone())?),
    })
}
