//! Remote-backed mode for inventory devices.
//!
//! The remote side stores a device as one flattened row plus ordered child sheet rows, each with
//! its own id. [`SyncAdapter`] translates between that shape and [`inventory_model::Device`],
//! keeps a query cache (device list, per-device detail, stats), applies cell edits
//! optimistically with full rollback on failure, and honors the device/end-user reference
//! contract.
//!
//! This mode is separate from the local store in `inventory-store`; the two caches are never
//! merged.

mod adapter;
mod cache;
mod error;
mod memory;
mod remote;
mod rows;
mod translate;

pub use adapter::{SyncAdapter, SyncConfig};
pub use cache::{DeviceDetail, QueryKey};
pub use error::{RemoteError, RemoteResult, SyncError, SyncResult};
pub use memory::InMemoryRemote;
pub use remote::{DeviceRemote, EndUserRemote};
pub use rows::{
    AvailableDevice, DeviceRow, DeviceRowInsert, DeviceRowPatch, DeviceWithSheets, EndUser,
    EndUserInsert, EndUserUpdate, NewSheetRow, SheetOrder, SheetRow,
};
pub use translate::{
    device_from_remote, device_from_row, device_to_insert, device_to_sheet_rows,
    info_patch_to_row, info_to_insert, SheetIdMap,
};
