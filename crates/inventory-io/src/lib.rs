//! Workbook import and export for inventory devices.
//!
//! Import decodes any workbook format calamine can auto-detect into a [`Device`]: sheet names are
//! normalized, each sheet's first row becomes the column headers, and the device identity is read
//! from the configuration sheet through a priority-ordered alias table. Export writes one
//! worksheet per sheet table with auto-sized columns.
//!
//! [`Device`]: inventory_model::Device

mod error;
mod export;
mod file;
mod identity;
mod import;
mod table;

pub use error::{ExportError, ImportError};
pub use export::{
    column_widths, export_device, export_device_async, export_device_on, export_file_name,
    excel_sheet_names, ExportedWorkbook, MAX_COLUMN_WIDTH,
};
pub use file::WorkbookFile;
pub use identity::{
    extract_device_info, IdentityField, CONFIG_SHEET_NAMES, DEFAULT_CPU, DEFAULT_OS, DEFAULT_RAM,
};
pub use import::{parse_workbook, parse_workbook_async, scan_sheet_names, scan_sheet_names_async};
