//! Durable persistence medium for the local device store.
//!
//! The store serializes its whole state into one JSON document addressed by a store name.
//! This crate provides the [`BlobStore`] media that hold such documents and the
//! [`PersistWriter`] that applies writes in the background:
//! - [`SqliteBlobStore`]: one `kv_store` table in a SQLite database
//! - [`DirBlobStore`]: one `<name>.json` file per store, replaced atomically
//! - [`MemoryBlobStore`]: process-local, for tests and ephemeral sessions

mod blob;
mod dir;
mod location;
mod schema;
mod sqlite;
mod writer;

pub use blob::{BlobStore, MemoryBlobStore};
pub use dir::DirBlobStore;
pub use location::{open_blob_store, PersistenceLocation};
pub use sqlite::SqliteBlobStore;
pub use writer::{
    Encoder, FailureListener, ListenerId, PersistConfig, PersistFailure, PersistWriter,
};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid store name {0:?}")]
    InvalidName(String),
    #[error("persistence writer is shut down")]
    WriterClosed,
    #[error("storage task failed: {0}")]
    Task(String),
    #[error("could not encode {name:?}: {message}")]
    Encode { name: String, message: String },
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
