use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use inventory_io::WorkbookFile;
use inventory_model::{CellValue, DeviceInfoPatch, DevicePatch, DeviceStatus};
use inventory_storage::{BlobStore, MemoryBlobStore, PersistConfig, PersistenceLocation, StorageError};
use inventory_store::{DeviceStore, StoreConfig, StoreError, StoreEvent};
use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;

fn workbook(name: &str, sheets: &[&str]) -> WorkbookFile {
    let mut wb = Workbook::new();
    let config = wb.add_worksheet();
    config.set_name("Cau hinh").unwrap();
    config.write_string(0, 0, "Ten may").unwrap();
    config.write_string(0, 1, "RAM").unwrap();
    config.write_string(1, 0, name).unwrap();
    config.write_string(1, 1, "8 GB").unwrap();
    for sheet in sheets {
        let ws = wb.add_worksheet();
        ws.set_name(*sheet).unwrap();
        ws.write_string(0, 0, "Product").unwrap();
        ws.write_string(0, 1, "Seats").unwrap();
        ws.write_string(1, 0, "Office").unwrap();
        ws.write_number(1, 1, 5).unwrap();
    }
    WorkbookFile::new(format!("{name}_inventory.xlsx"), wb.save_to_buffer().unwrap())
}

fn corrupt(name: &str) -> WorkbookFile {
    WorkbookFile::new(name, b"this is not a spreadsheet".to_vec())
}

async fn store() -> DeviceStore {
    DeviceStore::in_memory(StoreConfig::default()).await
}

fn recorder(store: &DeviceStore) -> Arc<Mutex<Vec<StoreEvent>>> {
    let events: Arc<Mutex<Vec<StoreEvent>>> = Arc::default();
    let sink = events.clone();
    store.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

#[tokio::test(flavor = "current_thread")]
async fn add_device_appends_and_clears_loading() {
    let store = store().await;
    let device = store.add_device(workbook("SRV01", &["License"]), None).await.unwrap();

    assert_eq!(device.device_info.name, "SRV01");
    assert_eq!(store.len(), 1);
    assert!(!store.is_loading());
    assert!(store.can_undo());
}

#[tokio::test(flavor = "current_thread")]
async fn loading_flag_is_raised_while_an_import_is_in_flight() {
    let store = Arc::new(store().await);
    let seen: Arc<Mutex<Vec<bool>>> = Arc::default();
    let sink = seen.clone();
    let weak: Weak<DeviceStore> = Arc::downgrade(&store);
    store.subscribe(move |event| {
        if let (StoreEvent::Imported { .. }, Some(store)) = (event, weak.upgrade()) {
            sink.lock().unwrap().push(store.is_loading());
        }
    });

    store.add_device(workbook("SRV01", &[]), None).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![true]);
    assert!(!store.is_loading());
}

#[tokio::test(flavor = "current_thread")]
async fn failed_import_leaves_store_unchanged() {
    let store = store().await;
    let events = recorder(&store);

    let err = store.add_device(corrupt("bad.xlsx"), None).await.unwrap_err();
    assert!(matches!(err, StoreError::Import(_)), "{err}");
    assert!(store.is_empty());
    assert!(!store.is_loading());
    assert!(!store.can_undo());
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, StoreEvent::ImportFailed { file_name, .. } if file_name == "bad.xlsx")));
}

#[tokio::test(flavor = "current_thread")]
async fn batch_import_tolerates_individual_failures() {
    let store = store().await;
    let events = recorder(&store);

    let summary = store
        .add_multiple_devices(
            vec![workbook("PC01", &[]), corrupt("PC02.xlsx"), workbook("PC03", &[])],
            None,
        )
        .await;

    assert_eq!(
        (summary.success_count, summary.fail_count, summary.total),
        (2, 1, 3)
    );
    assert_eq!(summary.failures[0].file_name, "PC02.xlsx");
    let names: Vec<String> = store
        .devices()
        .iter()
        .map(|d| d.device_info.name.clone())
        .collect();
    assert_eq!(names, vec!["PC01", "PC03"]);
    assert_eq!(store.import_progress(), None);
    assert!(!store.is_loading());

    // One batch mutation: a single undo removes both devices.
    assert!(store.undo());
    assert!(store.is_empty());

    let events = events.lock().unwrap();
    let progress: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StoreEvent::Progress(p) => Some((p.current, p.success, p.failed)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 0, 0), (2, 1, 0), (3, 1, 1), (3, 2, 1)]);
    assert!(events
        .iter()
        .any(|e| matches!(e, StoreEvent::BatchImported(s) if s.success_count == 2)));
}

#[tokio::test(flavor = "current_thread")]
async fn undo_redo_restores_snapshots_and_is_a_no_op_past_the_ends() {
    let store = store().await;
    store.add_device(workbook("SRV01", &[]), None).await.unwrap();
    let after_add = store.snapshot();

    assert!(store.undo());
    assert!(store.is_empty());
    assert!(store.redo());
    assert_eq!(store.snapshot(), after_add);

    assert!(store.undo());
    assert!(!store.undo());
    assert!(!store.undo());
    assert!(store.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn history_depth_is_bounded() {
    let store = DeviceStore::in_memory(StoreConfig {
        history_limit: 2,
        ..Default::default()
    })
    .await;
    let id = store.add_device(workbook("SRV01", &[]), None).await.unwrap().id.clone();
    store.set_status(&id, DeviceStatus::Broken);
    store.set_status(&id, DeviceStatus::Inactive);

    assert!(store.undo());
    assert!(store.undo());
    assert!(!store.undo());
    // The add itself was evicted, so the device survives.
    assert_eq!(store.device(&id).unwrap().status, DeviceStatus::Active);
}

#[tokio::test(flavor = "current_thread")]
async fn tags_are_deduplicated() {
    let store = store().await;
    let id = store.add_device(workbook("SRV01", &[]), None).await.unwrap().id.clone();

    assert!(store.add_tag(&id, "prod"));
    assert!(!store.add_tag(&id, "prod"));
    assert!(!store.add_tag(&id, "  "));
    assert_eq!(store.device(&id).unwrap().metadata.tags, vec!["prod"]);

    assert!(store.remove_tag(&id, "prod"));
    assert!(store.device(&id).unwrap().metadata.tags.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn updates_to_unknown_ids_are_silent_but_remove_is_not() {
    let store = store().await;
    store.add_device(workbook("SRV01", &[]), None).await.unwrap();
    let before = store.snapshot();

    assert!(!store.update_device(
        "nope",
        DevicePatch {
            status: Some(DeviceStatus::Broken),
            ..Default::default()
        }
    ));
    assert!(!store.set_status("nope", DeviceStatus::Broken));
    assert!(!store.update_sheet_cell("nope", "cau_hinh", 0, "RAM", "16 GB"));
    assert_eq!(store.snapshot(), before);

    assert!(matches!(store.remove_device("nope"), Err(StoreError::NotFound(_))));
    assert!(matches!(
        store.export_device_by_id("nope").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn cell_edits_touch_exactly_one_cell() {
    let store = store().await;
    let id = store
        .add_device(workbook("SRV01", &["License"]), None)
        .await
        .unwrap()
        .id
        .clone();

    assert!(store.update_sheet_cell(&id, "license", 0, "Seats", 12.0));
    let device = store.device(&id).unwrap();
    let license = device.sheets.get("license").unwrap();
    assert_eq!(license[0].get("Seats"), Some(&CellValue::Number(12.0)));
    assert_eq!(license[0].get("Product"), Some(&CellValue::from("Office")));
    assert_eq!(
        device.sheets.get("cau_hinh").unwrap()[0].get("RAM"),
        Some(&CellValue::from("8 GB"))
    );

    assert!(!store.update_sheet_cell(&id, "license", 5, "Seats", 1.0));
}

#[tokio::test(flavor = "current_thread")]
async fn remove_clears_selection_and_can_be_reversed() {
    let store = store().await;
    let events = recorder(&store);
    let original = store.add_device(workbook("SRV01", &["License"]), None).await.unwrap();
    store.add_device(workbook("SRV02", &[]), None).await.unwrap();
    assert!(store.set_selected_device(Some(original.id.as_str())));

    let removed = store.remove_device(&original.id).unwrap();
    assert_eq!(store.selected_device_id(), None);
    assert_eq!(store.len(), 1);
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, StoreEvent::Removed(d) if d.id == original.id)));

    assert_eq!(store.restore_last_removed(), Some(original.id.clone()));
    let restored = store.device(&original.id).unwrap();
    assert_eq!(*restored, *removed);
    assert_eq!(restored.metadata.imported_at, original.metadata.imported_at);
    assert_eq!(store.devices().last().unwrap().id, original.id);
    assert_eq!(store.last_removed(), None);

    // Restoring again would duplicate the id.
    assert!(!store.restore_device(removed));
}

#[tokio::test(flavor = "current_thread")]
async fn undo_of_add_drops_selection_of_the_vanished_device() {
    let store = store().await;
    let device = store.add_device(workbook("SRV01", &[]), None).await.unwrap();
    store.set_selected_device(Some(device.id.as_str()));
    assert!(store.selected_device().is_some());

    store.undo();
    assert_eq!(store.selected_device_id(), None);
    assert!(!store.set_selected_device(Some(device.id.as_str())));
}

#[tokio::test(flavor = "current_thread")]
async fn visible_sheets_and_identity_edits() {
    let store = store().await;
    let id = store
        .add_device(workbook("SRV01", &["License", "Software"]), None)
        .await
        .unwrap()
        .id
        .clone();

    assert_eq!(
        store.visible_sheets(&id).unwrap(),
        vec!["cau_hinh", "license", "software"]
    );
    store.set_default_visible_sheets(vec!["License".into()]);
    assert_eq!(store.visible_sheets(&id).unwrap(), vec!["license"]);
    store.update_device_visible_sheets(&id, vec!["software".into()]);
    assert_eq!(store.visible_sheets(&id).unwrap(), vec!["software"]);
    store.clear_device_visible_sheets(&id);
    assert_eq!(store.visible_sheets(&id).unwrap(), vec!["license"]);

    store.update_device_info(
        &id,
        DeviceInfoPatch {
            ip: Some("10.0.0.9".into()),
            ..Default::default()
        },
    );
    let device = store.device(&id).unwrap();
    assert_eq!(device.device_info.ip, "10.0.0.9");
    assert_eq!(device.device_info.name, "SRV01");

    assert!(store.undo());
    assert_eq!(store.device(&id).unwrap().device_info.ip, "");
}

#[tokio::test(flavor = "current_thread")]
async fn export_reports_to_subscribers() {
    let store = store().await;
    let events = recorder(&store);
    let id = store.add_device(workbook("SRV01", &[]), None).await.unwrap().id.clone();

    let exported = store.export_device_by_id(&id).await.unwrap();
    assert!(exported.file_name.starts_with("SRV01_"));
    assert!(exported.file_name.ends_with(".xlsx"));
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, StoreEvent::Exported { device_id, .. } if *device_id == id)));
}

#[tokio::test(flavor = "current_thread")]
async fn state_survives_reopen_but_session_does_not() {
    let tmp = tempfile::tempdir().unwrap();
    let location = PersistenceLocation::Sqlite(tmp.path().join("inventory.sqlite"));

    let id = {
        let store = DeviceStore::open(&location, StoreConfig::default()).await.unwrap();
        let device = store.add_device(workbook("SRV01", &["License"]), None).await.unwrap();
        store.add_tag(&device.id, "prod");
        store.set_default_visible_sheets(vec!["license".into()]);
        store.set_selected_device(Some(device.id.as_str()));
        store.flush().await.unwrap();
        store.shutdown().await.unwrap();
        device.id.clone()
    };

    let reopened = DeviceStore::open(&location, StoreConfig::default()).await.unwrap();
    let device = reopened.device(&id).unwrap();
    assert_eq!(device.metadata.tags, vec!["prod"]);
    assert_eq!(device.sheets.names().collect::<Vec<_>>(), vec!["cau_hinh", "license"]);
    assert_eq!(reopened.default_visible_sheets(), vec!["license"]);
    assert_eq!(reopened.selected_device_id(), None);
    assert!(!reopened.can_undo());
}

#[tokio::test(flavor = "current_thread")]
async fn unreadable_persisted_state_starts_empty() {
    let blob = Arc::new(MemoryBlobStore::new());
    inventory_storage::BlobStore::set(blob.as_ref(), "device-storage", "{\"version\":1,").unwrap();

    let store = DeviceStore::with_blob_store(blob, StoreConfig::default()).await;
    assert!(store.is_empty());
    store.add_device(workbook("SRV01", &[]), None).await.unwrap();
    assert_eq!(store.len(), 1);
}

/// Reads nothing and refuses every write.
struct FullDisk;

impl BlobStore for FullDisk {
    fn get(&self, _name: &str) -> inventory_storage::Result<Option<String>> {
        Ok(None)
    }

    fn set(&self, _name: &str, _value: &str) -> inventory_storage::Result<()> {
        Err(StorageError::Other("disk full".into()))
    }

    fn delete(&self, _name: &str) -> inventory_storage::Result<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "current_thread")]
async fn failed_saves_are_reported_and_state_stays_visible() {
    let config = StoreConfig {
        persist: PersistConfig {
            save_delay: Duration::from_millis(5),
            max_retries: 1,
            retry_backoff: Duration::from_millis(1),
        },
        ..StoreConfig::default()
    };
    let store = DeviceStore::with_blob_store(Arc::new(FullDisk), config).await;
    let events = recorder(&store);

    let device = store.add_device(workbook("SRV01", &["License"]), None).await.unwrap();
    store.flush().await.unwrap();

    let warnings: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            StoreEvent::PersistenceWarning(message) => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("after 2 attempts"));
    assert!(warnings[0].contains("disk full"));
    assert_eq!(store.len(), 1);
    assert_eq!(store.device(&device.id).unwrap().device_info.name, "SRV01");
}
