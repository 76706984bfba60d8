use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use inventory_io::{export_device_async, parse_workbook_async, ExportedWorkbook, WorkbookFile};
use inventory_model::{
    normalize_sheet_name, CellValue, Device, DeviceInfoPatch, DevicePatch, DeviceStats,
    DeviceStatus,
};
use inventory_storage::{
    open_blob_store, BlobStore, ListenerId, MemoryBlobStore, PersistWriter, PersistenceLocation,
};

use crate::event::{BatchFailure, BatchSummary, ImportProgress, StoreEvent, SubscriptionId};
use crate::history::History;
use crate::persist::{rehydrate, Persisted};
use crate::state::{Action, DeviceCollection, Effect, StateCore};
use crate::{Result, StoreConfig, StoreError};

type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
}

impl Subscribers {
    fn emit(&self, events: &[StoreEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .expect("subscriber mutex poisoned")
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for event in events {
            for listener in &listeners {
                listener(event);
            }
        }
    }
}

/// Transient session state. Never persisted, never part of undo history.
#[derive(Default)]
struct Session {
    selected: Option<String>,
    loading: usize,
    progress: Option<ImportProgress>,
    last_removed: Option<Arc<Device>>,
}

struct Inner {
    history: History<Persisted<DeviceCollection>>,
    session: Session,
}

impl Inner {
    fn state(&self) -> &DeviceCollection {
        self.history.state()
    }

    /// Dispatch through the history and persistence layers, collecting the resulting events.
    fn dispatch(&mut self, action: Action, events: &mut Vec<StoreEvent>) -> Option<Effect> {
        let effect = self.history.dispatch(action);
        if effect.is_some() {
            events.push(StoreEvent::Changed);
        }
        self.drain_warnings(events);
        effect
    }

    fn drain_warnings(&mut self, events: &mut Vec<StoreEvent>) {
        events.extend(
            self.history
                .inner_mut()
                .take_warnings()
                .into_iter()
                .map(StoreEvent::PersistenceWarning),
        );
    }

    /// Drop the selection if the selected device no longer exists.
    fn reconcile_selection(&mut self, events: &mut Vec<StoreEvent>) {
        let stale = match &self.session.selected {
            Some(id) => !self.history.state().contains(id),
            None => false,
        };
        if stale {
            self.session.selected = None;
            events.push(StoreEvent::SessionChanged);
        }
    }
}

/// The local device store.
///
/// Every action is one atomic transition under the store's mutex; the lock is never held across
/// an await. Subscribers are notified after the lock is released.
pub struct DeviceStore {
    inner: Mutex<Inner>,
    writer: Arc<PersistWriter>,
    subscribers: Arc<Subscribers>,
    failure_listener: ListenerId,
    config: StoreConfig,
}

pub type SharedDeviceStore = Arc<DeviceStore>;

impl DeviceStore {
    /// Open the durable medium at `location` and rehydrate from it.
    pub async fn open(location: &PersistenceLocation, config: StoreConfig) -> Result<Self> {
        let blob = open_blob_store(location)?;
        Ok(Self::with_blob_store(blob, config).await)
    }

    /// A store persisting to process memory only.
    pub async fn in_memory(config: StoreConfig) -> Self {
        Self::with_blob_store(Arc::new(MemoryBlobStore::new()), config).await
    }

    /// Rehydrate from `blob`, then start persisting to it. A failed or empty rehydration
    /// starts the store empty.
    pub async fn with_blob_store(blob: Arc<dyn BlobStore>, config: StoreConfig) -> Self {
        let state = rehydrate(blob.clone(), &config.store_name).await;

        let writer = Arc::new(PersistWriter::spawn(blob, config.persist.clone()));
        let subscribers = Arc::new(Subscribers::default());
        let sink = subscribers.clone();
        let failure_listener = writer.on_failure(move |failure| {
            sink.emit(&[StoreEvent::PersistenceWarning(format!(
                "could not save {} after {} attempts: {}",
                failure.store_name, failure.attempts, failure.message
            ))]);
        });

        let persisted = Persisted::new(state, writer.clone(), config.store_name.clone());
        Self {
            inner: Mutex::new(Inner {
                history: History::new(persisted, config.history_limit),
                session: Session::default(),
            }),
            writer,
            subscribers,
            failure_listener,
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }

    fn emit(&self, events: &[StoreEvent]) {
        self.subscribers.emit(events);
    }

    /// Apply one action and notify. Returns whether the state changed.
    fn commit(&self, action: Action) -> bool {
        let mut events = Vec::new();
        let changed = self.lock().dispatch(action, &mut events).is_some();
        self.emit(&events);
        changed
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&StoreEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.subscribers.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers
            .listeners
            .lock()
            .expect("subscriber mutex poisoned")
            .push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self
            .subscribers
            .listeners
            .lock()
            .expect("subscriber mutex poisoned");
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn snapshot(&self) -> DeviceCollection {
        self.lock().state().clone()
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.lock().state().devices.clone()
    }

    pub fn device(&self, id: &str) -> Option<Arc<Device>> {
        self.lock().state().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> DeviceStats {
        let inner = self.lock();
        DeviceStats::from_devices(inner.state().devices.iter().map(|d| d.as_ref()))
    }

    pub fn default_visible_sheets(&self) -> Vec<String> {
        self.lock().state().default_visible_sheets.clone()
    }

    /// The sheets shown for a device: its override, else the global default, else all sheets.
    pub fn visible_sheets(&self, id: &str) -> Option<Vec<String>> {
        let inner = self.lock();
        let state = inner.state();
        state
            .get(id)
            .map(|d| d.effective_visible_sheets(&state.default_visible_sheets))
    }

    pub fn is_loading(&self) -> bool {
        self.lock().session.loading > 0
    }

    pub fn import_progress(&self) -> Option<ImportProgress> {
        self.lock().session.progress
    }

    pub fn selected_device_id(&self) -> Option<String> {
        self.lock().session.selected.clone()
    }

    pub fn selected_device(&self) -> Option<Arc<Device>> {
        let inner = self.lock();
        let id = inner.session.selected.as_deref()?;
        inner.state().get(id).cloned()
    }

    /// The most recently removed device, kept so the removal can be reversed.
    pub fn last_removed(&self) -> Option<Arc<Device>> {
        self.lock().session.last_removed.clone()
    }

    pub fn can_undo(&self) -> bool {
        self.lock().history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.lock().history.can_redo()
    }

    fn begin_loading(&self, batch: bool) -> LoadingGuard<'_> {
        self.lock().session.loading += 1;
        self.emit(&[StoreEvent::SessionChanged]);
        LoadingGuard { store: self, batch }
    }

    fn set_progress(&self, progress: ImportProgress) {
        self.lock().session.progress = Some(progress);
        self.emit(&[StoreEvent::Progress(progress)]);
    }

    /// Parse `file` and append the resulting device.
    ///
    /// On failure the collection is untouched and the parse error is returned.
    pub async fn add_device(
        &self,
        file: WorkbookFile,
        selected_sheets: Option<Vec<String>>,
    ) -> Result<Arc<Device>> {
        let _loading = self.begin_loading(false);
        let file_name = file.name.clone();

        match parse_workbook_async(file, selected_sheets).await {
            Ok(device) => {
                let device = Arc::new(device);
                let mut events = Vec::new();
                self.lock()
                    .dispatch(Action::Append(vec![device.clone()]), &mut events);
                events.push(StoreEvent::Imported {
                    device_id: device.id.clone(),
                    name: device.device_info.name.clone(),
                });
                self.emit(&events);
                Ok(device)
            }
            Err(err) => {
                log::warn!("import of {file_name} failed: {err}");
                self.emit(&[StoreEvent::ImportFailed {
                    file_name,
                    message: err.to_string(),
                }]);
                Err(err.into())
            }
        }
    }

    /// Import `files` one after another. Failed files are counted and skipped; every parsed
    /// device is appended in a single action, in file order.
    pub async fn add_multiple_devices(
        &self,
        files: Vec<WorkbookFile>,
        selected_sheets: Option<Vec<String>>,
    ) -> BatchSummary {
        let _loading = self.begin_loading(true);
        let total = files.len();
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        let mut parsed = Vec::with_capacity(total);

        for (index, file) in files.into_iter().enumerate() {
            self.set_progress(ImportProgress {
                current: index + 1,
                total,
                success: summary.success_count,
                failed: summary.fail_count,
            });

            let file_name = file.name.clone();
            match parse_workbook_async(file, selected_sheets.clone()).await {
                Ok(device) => {
                    summary.success_count += 1;
                    summary.device_ids.push(device.id.clone());
                    parsed.push(Arc::new(device));
                }
                Err(err) => {
                    log::warn!("batch import: {file_name} failed: {err}");
                    summary.fail_count += 1;
                    let message = err.to_string();
                    summary.failures.push(BatchFailure {
                        file_name: file_name.clone(),
                        message: message.clone(),
                    });
                    self.emit(&[StoreEvent::ImportFailed { file_name, message }]);
                }
            }
        }

        self.set_progress(ImportProgress {
            current: total,
            total,
            success: summary.success_count,
            failed: summary.fail_count,
        });

        let mut events = Vec::new();
        self.lock().dispatch(Action::Append(parsed), &mut events);
        log::info!(
            "batch import finished: {} imported, {} failed",
            summary.success_count,
            summary.fail_count
        );
        events.push(StoreEvent::BatchImported(summary.clone()));
        self.emit(&events);
        summary
    }

    /// Remove a device. The removed device is returned and kept as [`Self::last_removed`].
    pub fn remove_device(&self, id: &str) -> Result<Arc<Device>> {
        let mut events = Vec::new();
        let removed = {
            let mut inner = self.lock();
            match inner.dispatch(Action::Remove(id.to_string()), &mut events) {
                Some(Effect::Removed(device)) => {
                    inner.session.last_removed = Some(device.clone());
                    inner.reconcile_selection(&mut events);
                    Some(device)
                }
                _ => None,
            }
        };

        let Some(device) = removed else {
            self.emit(&events);
            return Err(StoreError::NotFound(id.to_string()));
        };
        events.push(StoreEvent::Removed(device.clone()));
        self.emit(&events);
        Ok(device)
    }

    /// Append a previously removed device as-is: same id, metadata and sheets.
    ///
    /// Returns `false` if a device with that id is already present.
    pub fn restore_device(&self, device: Arc<Device>) -> bool {
        let mut events = Vec::new();
        let restored = {
            let mut inner = self.lock();
            if inner.state().contains(&device.id) {
                log::warn!("not restoring {}: id already present", device.id);
                false
            } else {
                let is_last = inner
                    .session
                    .last_removed
                    .as_ref()
                    .is_some_and(|d| d.id == device.id);
                if is_last {
                    inner.session.last_removed = None;
                }
                inner
                    .dispatch(Action::Append(vec![device.clone()]), &mut events)
                    .is_some()
            }
        };
        if restored {
            events.push(StoreEvent::Restored {
                device_id: device.id.clone(),
            });
        }
        self.emit(&events);
        restored
    }

    /// Reverse the most recent removal. Returns the restored device id.
    pub fn restore_last_removed(&self) -> Option<String> {
        let device = self.lock().session.last_removed.clone()?;
        let id = device.id.clone();
        self.restore_device(device).then_some(id)
    }

    /// Replace the top-level fields set in `patch`. Unknown ids are ignored, as they are by
    /// every field update below.
    pub fn update_device(&self, id: &str, patch: DevicePatch) -> bool {
        self.commit(Action::Update {
            id: id.to_string(),
            patch,
        })
    }

    pub fn update_device_info(&self, id: &str, patch: DeviceInfoPatch) -> bool {
        self.commit(Action::UpdateInfo {
            id: id.to_string(),
            patch,
        })
    }

    pub fn update_device_visible_sheets(&self, id: &str, sheets: Vec<String>) -> bool {
        let sheets = sheets.iter().map(|s| normalize_sheet_name(s)).collect();
        self.commit(Action::SetVisibleSheets {
            id: id.to_string(),
            sheets: Some(sheets),
        })
    }

    /// Drop the per-device override so the device inherits the global default again.
    pub fn clear_device_visible_sheets(&self, id: &str) -> bool {
        self.commit(Action::SetVisibleSheets {
            id: id.to_string(),
            sheets: None,
        })
    }

    pub fn set_default_visible_sheets(&self, sheets: Vec<String>) -> bool {
        let sheets = sheets.iter().map(|s| normalize_sheet_name(s)).collect();
        self.commit(Action::SetDefaultVisibleSheets(sheets))
    }

    pub fn set_status(&self, id: &str, status: DeviceStatus) -> bool {
        self.commit(Action::SetStatus {
            id: id.to_string(),
            status,
        })
    }

    pub fn add_tag(&self, id: &str, tag: &str) -> bool {
        self.commit(Action::AddTag {
            id: id.to_string(),
            tag: tag.to_string(),
        })
    }

    pub fn remove_tag(&self, id: &str, tag: &str) -> bool {
        self.commit(Action::RemoveTag {
            id: id.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Replace one cell of one row. Other rows and sheets are shared with the previous state.
    pub fn update_sheet_cell(
        &self,
        id: &str,
        sheet: &str,
        row: usize,
        column: &str,
        value: impl Into<CellValue>,
    ) -> bool {
        self.commit(Action::SetCell {
            id: id.to_string(),
            sheet: sheet.to_string(),
            row,
            column: column.to_string(),
            value: value.into(),
        })
    }

    pub fn undo(&self) -> bool {
        self.step_history(History::undo)
    }

    pub fn redo(&self) -> bool {
        self.step_history(History::redo)
    }

    fn step_history(
        &self,
        step: fn(&mut History<Persisted<DeviceCollection>>) -> bool,
    ) -> bool {
        let mut events = Vec::new();
        let moved = {
            let mut inner = self.lock();
            let moved = step(&mut inner.history);
            if moved {
                events.push(StoreEvent::Changed);
                inner.drain_warnings(&mut events);
                inner.reconcile_selection(&mut events);
            }
            moved
        };
        self.emit(&events);
        moved
    }

    /// Select a device, or clear the selection with `None`. Unknown ids are rejected.
    pub fn set_selected_device(&self, id: Option<&str>) -> bool {
        {
            let mut inner = self.lock();
            match id {
                Some(id) if !inner.state().contains(id) => return false,
                _ => inner.session.selected = id.map(str::to_string),
            }
        }
        self.emit(&[StoreEvent::SessionChanged]);
        true
    }

    /// Serialize `device` to an `.xlsx` workbook. Failures are reported to subscribers and
    /// returned; the store is never modified.
    pub async fn export_device(&self, device: &Device) -> Result<ExportedWorkbook> {
        let device_id = device.id.clone();
        match export_device_async(device.clone()).await {
            Ok(exported) => {
                self.emit(&[StoreEvent::Exported {
                    device_id,
                    file_name: exported.file_name.clone(),
                }]);
                Ok(exported)
            }
            Err(err) => {
                log::warn!("export of {device_id} failed: {err}");
                self.emit(&[StoreEvent::ExportFailed {
                    device_id,
                    message: err.to_string(),
                }]);
                Err(err.into())
            }
        }
    }

    pub async fn export_device_by_id(&self, id: &str) -> Result<ExportedWorkbook> {
        let device = self
            .device(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.export_device(&device).await
    }

    /// Wait until every queued state write has reached the durable medium.
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush().await?;
        self.emit(&[StoreEvent::Saved]);
        Ok(())
    }

    /// Flush and stop the background writer. Later mutations stay in memory only and surface
    /// persistence warnings.
    pub async fn shutdown(&self) -> Result<()> {
        self.writer.shutdown().await?;
        self.writer.remove_listener(self.failure_listener);
        Ok(())
    }

    pub fn save_count(&self) -> usize {
        self.writer.save_count()
    }
}

/// Keeps the loading flag raised while an import is in flight, including when the import
/// future is dropped early.
struct LoadingGuard<'a> {
    store: &'a DeviceStore,
    batch: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        {
            let mut inner = self.store.lock();
            inner.session.loading = inner.session.loading.saturating_sub(1);
            if self.batch {
                inner.session.progress = None;
            }
        }
        self.store.emit(&[StoreEvent::SessionChanged]);
    }
}
