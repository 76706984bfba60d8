//! Remote row shapes. Field names follow the remote tables (snake_case).

use chrono::{DateTime, Utc};
use inventory_model::{DeviceStatus, Row};
use serde::{Deserialize, Serialize};

/// One `devices` row: identity and metadata flattened into columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceRow {
    pub id: String,
    pub name: String,
    pub os: String,
    pub cpu: String,
    pub ram: String,
    pub architecture: String,
    pub ip: String,
    pub mac: String,
    pub last_update: String,
    #[serde(default)]
    pub status: DeviceStatus,
    pub file_name: String,
    pub file_size: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub visible_sheets: Option<Vec<String>>,
    pub imported_at: DateTime<Utc>,
    pub total_sheets: usize,
    pub total_rows: usize,
    #[serde(default)]
    pub end_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns supplied when creating a device; the remote assigns id and timestamps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceRowInsert {
    pub name: String,
    pub os: String,
    pub cpu: String,
    pub ram: String,
    pub architecture: String,
    pub ip: String,
    pub mac: String,
    pub last_update: String,
    pub status: DeviceStatus,
    pub file_name: String,
    pub file_size: String,
    pub tags: Vec<String>,
    pub visible_sheets: Option<Vec<String>>,
    pub imported_at: DateTime<Utc>,
    pub total_sheets: usize,
    pub total_rows: usize,
}

/// Partial update of a device row. `None` leaves a column untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRowPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl DeviceRowPatch {
    pub fn is_empty(&self) -> bool {
        self == &DeviceRowPatch::default()
    }

    pub fn apply(&self, row: &mut DeviceRow) {
        let text_fields = [
            (&self.name, &mut row.name),
            (&self.os, &mut row.os),
            (&self.cpu, &mut row.cpu),
            (&self.ram, &mut row.ram),
            (&self.architecture, &mut row.architecture),
            (&self.ip, &mut row.ip),
            (&self.mac, &mut row.mac),
            (&self.last_update, &mut row.last_update),
        ];
        for (patch, slot) in text_fields {
            if let Some(value) = patch {
                *slot = value.clone();
            }
        }
        if let Some(status) = self.status {
            row.status = status;
        }
        if let Some(tags) = &self.tags {
            row.tags = tags.clone();
        }
    }
}

/// One `device_sheets` row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SheetRow {
    pub id: String,
    pub device_id: String,
    pub sheet_name: String,
    pub sheet_data: Vec<Row>,
    pub sort_order: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSheetRow {
    pub sheet_name: String,
    pub sheet_data: Vec<Row>,
    pub sort_order: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SheetOrder {
    pub id: String,
    pub sort_order: i64,
}

/// A device row together with its child sheet rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceWithSheets {
    #[serde(flatten)]
    pub device: DeviceRow,
    #[serde(rename = "device_sheets", default)]
    pub sheets: Vec<SheetRow>,
}

/// A person a device can be assigned to. At most one end user references a given device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndUser {
    pub id: String,
    pub device_id: Option<String>,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndUserInsert {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub notes: Option<String>,
    pub device_id: Option<String>,
}

/// Partial update of an end user.
///
/// `device_id` is tri-state: `None` keeps the assignment, `Some(None)` releases it and
/// `Some(Some(id))` assigns (or re-assigns) a device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndUserUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub notes: Option<String>,
    pub device_id: Option<Option<String>>,
}

impl EndUserUpdate {
    pub fn apply(&self, user: &mut EndUser) {
        if let Some(full_name) = &self.full_name {
            user.full_name = full_name.clone();
        }
        let optional_fields = [
            (&self.email, &mut user.email),
            (&self.phone, &mut user.phone),
            (&self.department, &mut user.department),
            (&self.position, &mut user.position),
            (&self.notes, &mut user.notes),
        ];
        for (patch, slot) in optional_fields {
            if let Some(value) = patch {
                *slot = Some(value.clone());
            }
        }
        if let Some(device_id) = &self.device_id {
            user.device_id = device_id.clone();
        }
    }
}

/// A device no end user is assigned to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableDevice {
    pub id: String,
    pub name: String,
}
