//! `inventory-model` defines the in-memory representation of one imported IT asset.
//!
//! A [`Device`] is produced by the workbook parser (`inventory-io`) or by the remote sync
//! adapter's inbound translation, owned by the local store, and serialized as JSON for
//! durable persistence. Sheet rows have no fixed schema: each [`Row`] is an ordered list of
//! `(column, scalar)` pairs.

mod device;
mod patch;
mod row;
mod sheet_name;
mod sheets;
mod stats;
mod value;

pub use device::{
    device_name_from_file_name, format_file_size, new_device_id, Device, DeviceInfo,
    DeviceMetadata, DeviceStatus, ParseStatusError,
};
pub use patch::{DeviceInfoPatch, DevicePatch};
pub use row::{column_union, Row};
pub use sheet_name::{normalize_sheet_name, SHEET_NAME_JOIN};
pub use sheets::SheetMap;
pub use stats::{DeviceStats, LatestImport};
pub use value::CellValue;
