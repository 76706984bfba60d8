//! Device identity extraction from the configuration sheet.

use chrono::Local;
use inventory_model::{device_name_from_file_name, DeviceInfo, Row, SheetMap};

/// Normalized sheet names that mark the configuration sheet, in priority order.
pub const CONFIG_SHEET_NAMES: &[&str] = &["cau_hinh", "cấu_hình", "configuration", "config"];

pub const DEFAULT_OS: &str = "Unknown OS";
pub const DEFAULT_CPU: &str = "Unknown CPU";
pub const DEFAULT_RAM: &str = "Unknown RAM";

const LAST_UPDATE_FORMAT: &str = "%H:%M:%S %d/%m/%Y";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityField {
    Name,
    Os,
    Cpu,
    Ram,
    Architecture,
    Ip,
    Mac,
    LastUpdate,
}

impl IdentityField {
    /// Header labels accepted for this field. The first label present with a non-empty value wins.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            IdentityField::Name => &["Ten may", "Tên máy", "Device Name", "Hostname", "Name"],
            IdentityField::Os => &["He dieu hanh", "Hệ điều hành", "OS", "Operating System"],
            IdentityField::Cpu => &["CPU", "Processor"],
            IdentityField::Ram => &["RAM", "Memory"],
            IdentityField::Architecture => &["Kien truc", "Kiến trúc", "Architecture"],
            IdentityField::Ip => &["IP", "IP Address"],
            IdentityField::Mac => &["MAC", "MAC Address"],
            IdentityField::LastUpdate => &["Thoi gian", "Thời gian", "Last Update"],
        }
    }

    pub fn lookup(self, row: &Row) -> Option<String> {
        self.aliases().iter().find_map(|alias| {
            let value = row.get(alias).or_else(|| {
                row.iter()
                    .find(|(column, _)| header_matches(column, alias))
                    .map(|(_, value)| value)
            })?;
            let text = value.display();
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
    }
}

fn header_matches(column: &str, alias: &str) -> bool {
    column.trim().to_lowercase() == alias.to_lowercase()
}

/// The sheet identity is read from: the configuration sheet if present, else the first sheet.
pub(crate) fn identity_sheet(sheets: &SheetMap) -> Option<(&str, &[Row])> {
    CONFIG_SHEET_NAMES
        .iter()
        .find_map(|name| sheets.get(name).map(|rows| (*name, rows)))
        .or_else(|| sheets.first())
}

/// Build the identity record for a parsed workbook.
///
/// Missing fields fall back to fixed defaults; the name falls back to one derived from
/// `file_name`, and the last update to the current local time.
pub fn extract_device_info(sheets: &SheetMap, file_name: &str) -> DeviceInfo {
    let first_row = identity_sheet(sheets).and_then(|(_, rows)| rows.first());
    let field = |f: IdentityField| first_row.and_then(|row| f.lookup(row));

    let name = field(IdentityField::Name).unwrap_or_else(|| {
        log::debug!("no device name header found; deriving name from {file_name:?}");
        device_name_from_file_name(file_name)
    });

    DeviceInfo {
        name,
        os: field(IdentityField::Os).unwrap_or_else(|| DEFAULT_OS.to_string()),
        cpu: field(IdentityField::Cpu).unwrap_or_else(|| DEFAULT_CPU.to_string()),
        ram: field(IdentityField::Ram).unwrap_or_else(|| DEFAULT_RAM.to_string()),
        architecture: field(IdentityField::Architecture).unwrap_or_default(),
        ip: field(IdentityField::Ip).unwrap_or_default(),
        mac: field(IdentityField::Mac).unwrap_or_default(),
        last_update: field(IdentityField::LastUpdate)
            .unwrap_or_else(|| Local::now().format(LAST_UPDATE_FORMAT).to_string()),
    }
}
