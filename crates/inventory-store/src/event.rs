use std::sync::Arc;

use inventory_model::Device;
use serde::Serialize;

/// Running counters of a multi-file import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    /// 1-based index of the file being imported.
    pub current: usize,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub file_name: String,
    pub message: String,
}

/// Outcome of a multi-file import.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub success_count: usize,
    pub fail_count: usize,
    pub total: usize,
    /// Ids of the appended devices, in file order.
    pub device_ids: Vec<String>,
    pub failures: Vec<BatchFailure>,
}

/// Notifications delivered to subscribers after the store lock is released.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// The device collection or default visible sheets changed.
    Changed,
    /// Selection, loading flag or progress changed.
    SessionChanged,
    Progress(ImportProgress),
    Imported { device_id: String, name: String },
    ImportFailed { file_name: String, message: String },
    BatchImported(BatchSummary),
    /// Carries the removed device so it can be restored.
    Removed(Arc<Device>),
    Restored { device_id: String },
    Exported { device_id: String, file_name: String },
    ExportFailed { device_id: String, message: String },
    /// All queued persistence writes have landed.
    Saved,
    PersistenceWarning(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);
