use thiserror::Error;

/// Failure reported by a remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("sheet {sheet:?} not found on device {device_id}")]
    SheetNotFound { device_id: String, sheet: String },
    #[error("device {device_id} already has a sheet named {sheet:?}")]
    SheetAlreadyExists { device_id: String, sheet: String },
    #[error("device {device_id} is already assigned to end user {end_user_id}")]
    DeviceAlreadyAssigned {
        device_id: String,
        end_user_id: String,
    },
}

impl SyncError {
    pub(crate) fn remote(operation: &'static str) -> impl FnOnce(RemoteError) -> SyncError {
        move |source| SyncError::Remote { operation, source }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
