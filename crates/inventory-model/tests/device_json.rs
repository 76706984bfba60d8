use chrono::{TimeZone, Utc};
use inventory_model::{
    CellValue, Device, DeviceInfo, DeviceMetadata, DevicePatch, DeviceStats, DeviceStatus, Row,
    SheetMap,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn sample_device(id: &str, name: &str, status: DeviceStatus, day: u32) -> Device {
    let cfg: Row = [("Ten may", CellValue::from(name)), ("RAM", CellValue::from("16 GB"))]
        .into_iter()
        .collect();
    let license: Row = [("Product", CellValue::from("Office")), ("Seats", CellValue::from(5.0))]
        .into_iter()
        .collect();
    let sheets: SheetMap = [("cau_hinh", vec![cfg]), ("license", vec![license])]
        .into_iter()
        .collect();
    Device {
        id: id.to_string(),
        status,
        device_info: DeviceInfo {
            name: name.to_string(),
            ram: "16 GB".into(),
            ..Default::default()
        },
        file_name: format!("{name}_inventory.xlsx"),
        metadata: DeviceMetadata {
            total_sheets: sheets.len(),
            total_rows: sheets.total_rows(),
            file_size: "8.2 KB".into(),
            imported_at: Utc.with_ymd_and_hms(2025, 3, day, 8, 0, 0).unwrap(),
            tags: vec!["prod".into()],
            visible_sheets: None,
        },
        sheets,
    }
}

#[test]
fn persisted_shape_uses_camel_case_keys() {
    let device = sample_device("device_1", "SRV01", DeviceStatus::Broken, 1);
    let value = serde_json::to_value(&device).unwrap();

    assert_eq!(value["deviceInfo"]["name"], json!("SRV01"));
    assert_eq!(value["deviceInfo"]["lastUpdate"], json!(""));
    assert_eq!(value["fileName"], json!("SRV01_inventory.xlsx"));
    assert_eq!(value["status"], json!("broken"));
    assert_eq!(value["metadata"]["totalSheets"], json!(2));
    assert_eq!(value["metadata"]["importedAt"], json!("2025-03-01T08:00:00Z"));
    assert!(value["metadata"].get("visibleSheets").is_none());
    assert_eq!(value["sheets"]["license"][0]["Seats"], json!(5.0));

    let back: Device = serde_json::from_value(value).unwrap();
    assert_eq!(back, device);
}

#[test]
fn missing_status_defaults_to_active() {
    let mut value = serde_json::to_value(sample_device("d", "PC", DeviceStatus::Inactive, 2)).unwrap();
    value.as_object_mut().unwrap().remove("status");
    let device: Device = serde_json::from_value(value).unwrap();
    assert_eq!(device.status, DeviceStatus::Active);
}

#[test]
fn patch_replaces_top_level_fields_only() {
    let mut device = sample_device("device_1", "SRV01", DeviceStatus::Active, 1);
    let original_sheets = device.sheets.clone();
    DevicePatch {
        status: Some(DeviceStatus::Inactive),
        file_name: Some("renamed.xlsx".into()),
        ..Default::default()
    }
    .apply(&mut device);

    assert_eq!(device.id, "device_1");
    assert_eq!(device.status, DeviceStatus::Inactive);
    assert_eq!(device.file_name, "renamed.xlsx");
    assert_eq!(device.sheets, original_sheets);
}

#[test]
fn visible_sheets_fall_back_to_global_then_all() {
    let mut device = sample_device("device_1", "SRV01", DeviceStatus::Active, 1);
    assert_eq!(device.effective_visible_sheets(&[]), vec!["cau_hinh", "license"]);
    assert_eq!(
        device.effective_visible_sheets(&["license".to_string()]),
        vec!["license"]
    );
    device.metadata.visible_sheets = Some(vec!["cau_hinh".into()]);
    assert_eq!(
        device.effective_visible_sheets(&["license".to_string()]),
        vec!["cau_hinh"]
    );
}

#[test]
fn stats_aggregate_counts_and_latest_import() {
    let devices = vec![
        sample_device("a", "SRV01", DeviceStatus::Active, 1),
        sample_device("b", "SRV02", DeviceStatus::Broken, 9),
        sample_device("c", "SRV03", DeviceStatus::Active, 4),
    ];
    let stats = DeviceStats::from_devices(&devices);
    assert_eq!(stats.total_devices, 3);
    assert_eq!(stats.total_sheets, 6);
    assert_eq!(stats.total_rows, 6);
    assert_eq!(stats.count(DeviceStatus::Active), 2);
    assert_eq!(stats.count(DeviceStatus::Broken), 1);
    assert_eq!(stats.latest_import.unwrap().name, "SRV02");
}
