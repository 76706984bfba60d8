use crate::sheets::SheetMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of an asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Active,
    Broken,
    Inactive,
}

impl DeviceStatus {
    pub const ALL: [DeviceStatus; 3] = [
        DeviceStatus::Active,
        DeviceStatus::Broken,
        DeviceStatus::Inactive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Broken => "broken",
            DeviceStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown device status: {0:?} (expected active, broken or inactive)")]
pub struct ParseStatusError(pub String);

impl FromStr for DeviceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(DeviceStatus::Active),
            "broken" => Ok(DeviceStatus::Broken),
            "inactive" => Ok(DeviceStatus::Inactive),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Identity fields read from the configuration sheet. All free text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    pub os: String,
    pub cpu: String,
    pub ram: String,
    pub architecture: String,
    pub ip: String,
    pub mac: String,
    pub last_update: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetadata {
    /// Sheet count at import time. Not kept in sync with later edits.
    pub total_sheets: usize,
    /// Row count across all sheets at import time. Not kept in sync with later edits.
    pub total_rows: usize,
    /// Human readable source file size (`"12.4 KB"`).
    pub file_size: String,
    pub imported_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Per-device override of the visible sheets; `None` inherits the global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_sheets: Option<Vec<String>>,
}

impl DeviceMetadata {
    /// Add a tag. The tag is trimmed; empty and already-present tags are ignored.
    /// Returns whether the tag list changed.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }
}

/// One imported asset: identity, every materialized sheet table, and import metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Assigned once at creation and never changed.
    pub id: String,
    #[serde(default)]
    pub status: DeviceStatus,
    pub device_info: DeviceInfo,
    pub file_name: String,
    pub sheets: SheetMap,
    pub metadata: DeviceMetadata,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.device_info.name
    }

    /// Visible sheet names: the per-device override, else `global_default`, else every sheet.
    pub fn effective_visible_sheets(&self, global_default: &[String]) -> Vec<String> {
        if let Some(own) = &self.metadata.visible_sheets {
            return own.clone();
        }
        if !global_default.is_empty() {
            return global_default.to_vec();
        }
        self.sheets.names().map(str::to_string).collect()
    }

    /// Whether the import-time counters still match the sheet contents.
    pub fn metadata_matches_sheets(&self) -> bool {
        self.metadata.total_sheets == self.sheets.len()
            && self.metadata.total_rows == self.sheets.total_rows()
    }
}

/// Generate a new collision-resistant device id.
pub fn new_device_id() -> String {
    format!("device_{}", Uuid::new_v4().simple())
}

/// Format a byte count as `B`, `KB` or `MB` with one decimal place.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Fallback device name derived from a workbook file name.
///
/// `SRV01_inventory.xlsx` → `SRV01`; `laptop.xlsx` → `laptop`.
pub fn device_name_from_file_name(file_name: &str) -> String {
    if let Some(prefix) = file_name.split('_').next().filter(|p| !p.is_empty()) {
        if prefix.len() < file_name.len() {
            return prefix.to_string();
        }
    }
    strip_excel_extension(file_name).to_string()
}

fn strip_excel_extension(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    for ext in [".xlsx", ".xls"] {
        if lower.ends_with(ext) {
            return &file_name[..file_name.len() - ext.len()];
        }
    }
    file_name
}
