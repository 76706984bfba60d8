//! Translation between [`Device`] and the remote row shapes.

use std::collections::HashMap;

use chrono::Utc;
use inventory_model::{
    normalize_sheet_name, Device, DeviceInfo, DeviceInfoPatch, DeviceMetadata, DeviceStatus,
    SheetMap,
};

use crate::rows::{DeviceRow, DeviceRowInsert, DeviceRowPatch, NewSheetRow, SheetRow};

/// Normalized sheet name → remote sheet row id. Sheet mutations address sheets by id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SheetIdMap(HashMap<String, String>);

impl SheetIdMap {
    pub fn get(&self, sheet_name: &str) -> Option<&str> {
        self.0
            .get(&normalize_sheet_name(sheet_name))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn device_to_insert(device: &Device) -> DeviceRowInsert {
    let info = &device.device_info;
    let meta = &device.metadata;
    DeviceRowInsert {
        name: info.name.clone(),
        os: info.os.clone(),
        cpu: info.cpu.clone(),
        ram: info.ram.clone(),
        architecture: info.architecture.clone(),
        ip: info.ip.clone(),
        mac: info.mac.clone(),
        last_update: info.last_update.clone(),
        status: device.status,
        file_name: device.file_name.clone(),
        file_size: meta.file_size.clone(),
        tags: meta.tags.clone(),
        visible_sheets: meta.visible_sheets.clone(),
        imported_at: meta.imported_at,
        total_sheets: meta.total_sheets,
        total_rows: meta.total_rows,
    }
}

/// Child sheet rows in the device's sheet order.
pub fn device_to_sheet_rows(device: &Device) -> Vec<NewSheetRow> {
    device
        .sheets
        .iter()
        .enumerate()
        .map(|(index, (name, rows))| NewSheetRow {
            sheet_name: name.to_string(),
            sheet_data: rows.to_vec(),
            sort_order: index as i64,
        })
        .collect()
}

/// Insert payload for a device created by hand, with no sheets.
pub fn info_to_insert(info: &DeviceInfo, status: DeviceStatus) -> DeviceRowInsert {
    DeviceRowInsert {
        name: info.name.clone(),
        os: info.os.clone(),
        cpu: info.cpu.clone(),
        ram: info.ram.clone(),
        architecture: info.architecture.clone(),
        ip: info.ip.clone(),
        mac: info.mac.clone(),
        last_update: info.last_update.clone(),
        status,
        file_name: String::new(),
        file_size: inventory_model::format_file_size(0),
        tags: Vec::new(),
        visible_sheets: None,
        imported_at: Utc::now(),
        total_sheets: 0,
        total_rows: 0,
    }
}

pub fn info_patch_to_row(patch: &DeviceInfoPatch) -> DeviceRowPatch {
    DeviceRowPatch {
        name: patch.name.clone(),
        os: patch.os.clone(),
        cpu: patch.cpu.clone(),
        ram: patch.ram.clone(),
        architecture: patch.architecture.clone(),
        ip: patch.ip.clone(),
        mac: patch.mac.clone(),
        last_update: patch.last_update.clone(),
        ..Default::default()
    }
}

/// A device from its row alone (list views); sheets are left empty.
pub fn device_from_row(row: &DeviceRow) -> Device {
    Device {
        id: row.id.clone(),
        status: row.status,
        device_info: DeviceInfo {
            name: row.name.clone(),
            os: row.os.clone(),
            cpu: row.cpu.clone(),
            ram: row.ram.clone(),
            architecture: row.architecture.clone(),
            ip: row.ip.clone(),
            mac: row.mac.clone(),
            last_update: row.last_update.clone(),
        },
        file_name: row.file_name.clone(),
        sheets: SheetMap::new(),
        metadata: DeviceMetadata {
            total_sheets: row.total_sheets,
            total_rows: row.total_rows,
            file_size: row.file_size.clone(),
            imported_at: row.imported_at,
            tags: row.tags.clone(),
            visible_sheets: row.visible_sheets.clone(),
        },
    }
}

/// A full device from its row and child sheet rows, plus the sheet id side-map.
///
/// Sheets are ordered by `sort_order` (ties keep remote order) and keyed by normalized name.
pub fn device_from_remote(row: &DeviceRow, sheets: &[SheetRow]) -> (Device, SheetIdMap) {
    let mut ordered: Vec<&SheetRow> = sheets.iter().collect();
    ordered.sort_by_key(|sheet| sheet.sort_order);

    let mut device = device_from_row(row);
    let mut ids = HashMap::with_capacity(ordered.len());
    for sheet in ordered {
        let name = normalize_sheet_name(&sheet.sheet_name);
        device.sheets.insert(name.clone(), sheet.sheet_data.clone());
        ids.insert(name, sheet.id.clone());
    }
    (device, SheetIdMap(ids))
}
