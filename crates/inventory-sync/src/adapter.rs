use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use inventory_model::{
    normalize_sheet_name, CellValue, Device, DeviceInfo, DeviceInfoPatch, DeviceStats,
    DeviceStatus, Row,
};
use serde::{Deserialize, Serialize};

use crate::cache::{DeviceDetail, QueryCache, QueryKey};
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::remote::{DeviceRemote, EndUserRemote};
use crate::rows::{
    AvailableDevice, DeviceRowPatch, EndUser, EndUserInsert, EndUserUpdate, NewSheetRow,
    SheetOrder,
};
use crate::translate::{
    device_from_remote, device_from_row, device_to_insert, device_to_sheet_rows,
    info_patch_to_row, info_to_insert,
};

pub const DEFAULT_DETAIL_CACHE_CAPACITY: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Maximum number of device-detail entries kept in the query cache.
    pub detail_cache_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            detail_cache_capacity: DEFAULT_DETAIL_CACHE_CAPACITY,
        }
    }
}

/// Remote-backed access to devices and end users.
///
/// Reads go through a query cache. Every mutation calls the collaborator first; on failure the
/// cache is left as it was, on success the affected entries are invalidated and, if they were
/// cached, refetched. Cell edits are the one optimistic operation: see [`SyncAdapter::update_cell`].
pub struct SyncAdapter {
    devices: Arc<dyn DeviceRemote>,
    end_users: Arc<dyn EndUserRemote>,
    cache: Mutex<QueryCache>,
}

fn device_error(operation: &'static str, id: &str) -> impl FnOnce(RemoteError) -> SyncError {
    let id = id.to_string();
    move |err| match err {
        RemoteError::NotFound(_) => SyncError::DeviceNotFound(id),
        source => SyncError::Remote { operation, source },
    }
}

impl SyncAdapter {
    pub fn new(
        devices: Arc<dyn DeviceRemote>,
        end_users: Arc<dyn EndUserRemote>,
        config: SyncConfig,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.detail_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            devices,
            end_users,
            cache: Mutex::new(QueryCache::new(capacity)),
        }
    }

    fn cache(&self) -> MutexGuard<'_, QueryCache> {
        self.cache.lock().expect("query cache mutex poisoned")
    }

    // Queries

    /// Row-level view of every device (sheets are not loaded).
    pub async fn devices(&self) -> SyncResult<Arc<Vec<Device>>> {
        let cached = self.cache().list();
        match cached {
            Some(list) => Ok(list),
            None => self.fetch_list().await,
        }
    }

    pub async fn device_detail(&self, id: &str) -> SyncResult<Arc<DeviceDetail>> {
        let cached = self.cache().detail(id);
        match cached {
            Some(detail) => Ok(detail),
            None => self.fetch_detail(id).await,
        }
    }

    /// The cached detail for `id`, without fetching.
    pub fn cached_device_detail(&self, id: &str) -> Option<Arc<DeviceDetail>> {
        self.cache().peek_detail(id)
    }

    pub async fn stats(&self) -> SyncResult<DeviceStats> {
        let cached = self.cache().stats();
        match cached {
            Some(stats) => Ok(stats),
            None => self.fetch_stats().await,
        }
    }

    /// Drop one cache entry without refetching. Returns whether it was cached.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.cache().invalidate(key)
    }

    pub fn invalidate_all(&self) {
        self.cache().clear();
    }

    async fn fetch_list(&self) -> SyncResult<Arc<Vec<Device>>> {
        let ticket = self.cache().begin_fetch(QueryKey::List);
        let rows = self
            .devices
            .get_devices()
            .await
            .map_err(SyncError::remote("get_devices"))?;
        let list = Arc::new(rows.iter().map(device_from_row).collect::<Vec<_>>());
        if !self.cache().complete_list(ticket, Arc::clone(&list)) {
            log::debug!("discarded stale device list fetch");
        }
        Ok(list)
    }

    async fn fetch_detail(&self, id: &str) -> SyncResult<Arc<DeviceDetail>> {
        let ticket = self.cache().begin_fetch(QueryKey::Detail(id.to_string()));
        let remote = self
            .devices
            .get_device_with_sheets(id)
            .await
            .map_err(device_error("get_device_with_sheets", id))?;
        let (device, sheet_ids) = device_from_remote(&remote.device, &remote.sheets);
        let fetched = Arc::new(DeviceDetail {
            device,
            sheet_ids,
            end_user_id: remote.device.end_user_id.clone(),
            updated_at: remote.device.updated_at,
        });

        let mut cache = self.cache();
        if cache.complete_detail(ticket, Arc::clone(&fetched)) {
            return Ok(fetched);
        }
        log::debug!("discarded stale detail fetch for device {id}");
        Ok(cache.peek_detail(id).unwrap_or(fetched))
    }

    async fn fetch_stats(&self) -> SyncResult<DeviceStats> {
        let ticket = self.cache().begin_fetch(QueryKey::Stats);
        let stats = self
            .devices
            .get_device_stats()
            .await
            .map_err(SyncError::remote("get_device_stats"))?;
        self.cache().complete_stats(ticket, stats.clone());
        Ok(stats)
    }

    /// Invalidate `keys`, then refetch the ones that were cached. Refetch failures are logged;
    /// the entry simply stays empty until the next read.
    async fn refresh(&self, keys: Vec<QueryKey>) {
        let cached: Vec<QueryKey> = {
            let mut cache = self.cache();
            keys.into_iter().filter(|key| cache.invalidate(key)).collect()
        };
        for key in cached {
            let result = match &key {
                QueryKey::List => self.fetch_list().await.map(drop),
                QueryKey::Stats => self.fetch_stats().await.map(drop),
                QueryKey::Detail(id) => self.fetch_detail(id).await.map(drop),
            };
            if let Err(err) = result {
                log::warn!("refetch of {key:?} failed: {err}");
            }
        }
    }

    fn detail_key(id: &str) -> QueryKey {
        QueryKey::Detail(id.to_string())
    }

    // Device mutations

    /// Create an empty device from identity fields. Returns its row-level view.
    pub async fn create_device(&self, info: &DeviceInfo, status: DeviceStatus) -> SyncResult<Device> {
        let row = self
            .devices
            .create_device(info_to_insert(info, status))
            .await
            .map_err(SyncError::remote("create_device"))?;
        log::info!("created remote device {} ({})", row.id, row.name);
        self.refresh(vec![QueryKey::List, QueryKey::Stats]).await;
        Ok(device_from_row(&row))
    }

    /// Upload a parsed device with all of its sheets and return the server's view of it.
    pub async fn import_device(&self, device: &Device) -> SyncResult<Arc<DeviceDetail>> {
        let row = self
            .devices
            .import_device(device_to_insert(device), device_to_sheet_rows(device))
            .await
            .map_err(SyncError::remote("import_device"))?;
        log::info!(
            "imported device {} as {} with {} sheets",
            device.name(),
            row.id,
            device.sheets.len()
        );
        self.refresh(vec![QueryKey::List, QueryKey::Stats]).await;
        self.device_detail(&row.id).await
    }

    pub async fn update_device(&self, id: &str, patch: &DeviceInfoPatch) -> SyncResult<()> {
        self.devices
            .update_device(id, info_patch_to_row(patch))
            .await
            .map_err(device_error("update_device", id))?;
        self.refresh(vec![QueryKey::List, Self::detail_key(id)]).await;
        Ok(())
    }

    pub async fn update_status(&self, id: &str, status: DeviceStatus) -> SyncResult<()> {
        let patch = DeviceRowPatch {
            status: Some(status),
            ..Default::default()
        };
        self.devices
            .update_device(id, patch)
            .await
            .map_err(device_error("update_device", id))?;
        self.refresh(vec![QueryKey::List, Self::detail_key(id), QueryKey::Stats])
            .await;
        Ok(())
    }

    pub async fn update_visible_sheets(&self, id: &str, sheets: Vec<String>) -> SyncResult<()> {
        self.devices
            .update_device_visible_sheets(id, sheets)
            .await
            .map_err(device_error("update_device_visible_sheets", id))?;
        self.refresh(vec![QueryKey::List, Self::detail_key(id)]).await;
        Ok(())
    }

    /// Delete a device, then release any end-user assignment that points at it.
    ///
    /// If the device was deleted but releasing the assignment failed, the cache is still
    /// refreshed and the release failure is returned.
    pub async fn delete_device(&self, id: &str) -> SyncResult<()> {
        self.devices
            .delete_device(id)
            .await
            .map_err(device_error("delete_device", id))?;
        let released = self.end_users.clear_device_reference(id).await;

        self.cache().invalidate(&Self::detail_key(id));
        self.refresh(vec![QueryKey::List, QueryKey::Stats]).await;

        match released {
            Ok(0) => Ok(()),
            Ok(count) => {
                log::info!("released device {id} from {count} end user(s)");
                Ok(())
            }
            Err(err) => {
                log::warn!("device {id} deleted but its end-user reference was not cleared: {err}");
                Err(SyncError::remote("clear_device_reference")(err))
            }
        }
    }

    // Sheet mutations

    async fn sheet_id(&self, device_id: &str, sheet: &str) -> SyncResult<String> {
        let detail = self.device_detail(device_id).await?;
        detail
            .sheet_ids
            .get(sheet)
            .map(str::to_string)
            .ok_or_else(|| SyncError::SheetNotFound {
                device_id: device_id.to_string(),
                sheet: sheet.to_string(),
            })
    }

    pub async fn create_sheet(&self, device_id: &str, name: &str, rows: Vec<Row>) -> SyncResult<()> {
        let detail = self.device_detail(device_id).await?;
        let sheet_name = normalize_sheet_name(name);
        if detail.sheet_ids.get(&sheet_name).is_some() {
            return Err(SyncError::SheetAlreadyExists {
                device_id: device_id.to_string(),
                sheet: sheet_name,
            });
        }
        let sheet = NewSheetRow {
            sheet_name,
            sheet_data: rows,
            sort_order: detail.device.sheets.len() as i64,
        };
        self.devices
            .create_sheet(device_id, sheet)
            .await
            .map_err(SyncError::remote("create_sheet"))?;
        self.refresh(vec![Self::detail_key(device_id), QueryKey::List]).await;
        Ok(())
    }

    pub async fn update_sheet_data(&self, device_id: &str, sheet: &str, rows: Vec<Row>) -> SyncResult<()> {
        let sheet_id = self.sheet_id(device_id, sheet).await?;
        self.devices
            .update_sheet_data(&sheet_id, rows)
            .await
            .map_err(SyncError::remote("update_sheet_data"))?;
        self.refresh(vec![Self::detail_key(device_id)]).await;
        Ok(())
    }

    /// Add `column` to every row of a sheet that lacks it, with an empty text value.
    pub async fn add_column(&self, device_id: &str, sheet: &str, column: &str) -> SyncResult<()> {
        let detail = self.device_detail(device_id).await?;
        let sheet_name = normalize_sheet_name(sheet);
        let rows = detail
            .device
            .sheets
            .get(&sheet_name)
            .ok_or_else(|| SyncError::SheetNotFound {
                device_id: device_id.to_string(),
                sheet: sheet.to_string(),
            })?;
        let rows: Vec<Row> = rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                if row.get(column).is_none() {
                    row.set(column, CellValue::from(""));
                }
                row
            })
            .collect();
        self.update_sheet_data(device_id, &sheet_name, rows).await
    }

    pub async fn rename_sheet(&self, device_id: &str, sheet: &str, new_name: &str) -> SyncResult<()> {
        let sheet_id = self.sheet_id(device_id, sheet).await?;
        let new_name = normalize_sheet_name(new_name);
        let detail = self.device_detail(device_id).await?;
        if detail.sheet_ids.get(&new_name).is_some_and(|id| id != sheet_id) {
            return Err(SyncError::SheetAlreadyExists {
                device_id: device_id.to_string(),
                sheet: new_name,
            });
        }
        self.devices
            .rename_sheet(&sheet_id, &new_name)
            .await
            .map_err(SyncError::remote("rename_sheet"))?;
        self.refresh(vec![Self::detail_key(device_id)]).await;
        Ok(())
    }

    pub async fn delete_sheet(&self, device_id: &str, sheet: &str) -> SyncResult<()> {
        let sheet_id = self.sheet_id(device_id, sheet).await?;
        self.devices
            .delete_sheet(&sheet_id)
            .await
            .map_err(SyncError::remote("delete_sheet"))?;
        self.refresh(vec![Self::detail_key(device_id), QueryKey::List]).await;
        Ok(())
    }

    /// Persist a new sheet order. `names[i]` gets sort order `i`.
    pub async fn reorder_sheets(&self, device_id: &str, names: &[String]) -> SyncResult<()> {
        let detail = self.device_detail(device_id).await?;
        let order = names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let id = detail.sheet_ids.get(name).ok_or_else(|| SyncError::SheetNotFound {
                    device_id: device_id.to_string(),
                    sheet: name.clone(),
                })?;
                Ok(SheetOrder {
                    id: id.to_string(),
                    sort_order: index as i64,
                })
            })
            .collect::<SyncResult<Vec<_>>>()?;
        self.devices
            .reorder_sheets(order)
            .await
            .map_err(SyncError::remote("reorder_sheets"))?;
        self.refresh(vec![Self::detail_key(device_id)]).await;
        Ok(())
    }

    pub async fn add_row(&self, device_id: &str, sheet: &str, row: Row) -> SyncResult<()> {
        let sheet_id = self.sheet_id(device_id, sheet).await?;
        self.devices
            .add_row(&sheet_id, row)
            .await
            .map_err(SyncError::remote("add_row"))?;
        self.refresh(vec![Self::detail_key(device_id), QueryKey::List]).await;
        Ok(())
    }

    pub async fn delete_row(&self, device_id: &str, sheet: &str, row_index: usize) -> SyncResult<()> {
        let sheet_id = self.sheet_id(device_id, sheet).await?;
        self.devices
            .delete_row(&sheet_id, row_index)
            .await
            .map_err(SyncError::remote("delete_row"))?;
        self.refresh(vec![Self::detail_key(device_id), QueryKey::List]).await;
        Ok(())
    }

    /// Edit one cell optimistically.
    ///
    /// The cached detail is patched before the remote call so readers see the new value at
    /// once. If the call fails the pre-edit detail is put back as it was; if it succeeds the
    /// detail is refetched so server-computed fields are authoritative.
    pub async fn update_cell(
        &self,
        device_id: &str,
        sheet: &str,
        row_index: usize,
        column: &str,
        value: impl Into<CellValue>,
    ) -> SyncResult<()> {
        let value = value.into();
        let sheet_name = normalize_sheet_name(sheet);
        let previous = self.device_detail(device_id).await?;
        let sheet_id = previous
            .sheet_ids
            .get(&sheet_name)
            .map(str::to_string)
            .ok_or_else(|| SyncError::SheetNotFound {
                device_id: device_id.to_string(),
                sheet: sheet.to_string(),
            })?;

        let mut edited = DeviceDetail::clone(&previous);
        let applied = edited
            .device
            .sheets
            .set_cell(&sheet_name, row_index, column, value.clone());
        if applied {
            self.cache().replace_detail(device_id, Arc::new(edited));
        }

        match self
            .devices
            .update_sheet_cell(&sheet_id, row_index, column, value)
            .await
        {
            Ok(_) => {
                self.refresh(vec![Self::detail_key(device_id)]).await;
                Ok(())
            }
            Err(err) => {
                if applied {
                    self.cache().replace_detail(device_id, previous);
                }
                log::warn!("cell edit on {device_id}/{sheet_name}[{row_index}].{column} rolled back: {err}");
                Err(SyncError::remote("update_sheet_cell")(err))
            }
        }
    }

    // End users

    pub async fn end_users(&self) -> SyncResult<Vec<EndUser>> {
        self.end_users
            .get_end_users()
            .await
            .map_err(SyncError::remote("get_end_users"))
    }

    /// Fail with `DeviceAlreadyAssigned` if an end user other than `except` holds `device_id`.
    async fn ensure_unassigned(&self, device_id: &str, except: Option<&str>) -> SyncResult<()> {
        let users = self.end_users().await?;
        let holder = users.iter().find(|user| {
            user.device_id.as_deref() == Some(device_id) && Some(user.id.as_str()) != except
        });
        match holder {
            Some(user) => Err(SyncError::DeviceAlreadyAssigned {
                device_id: device_id.to_string(),
                end_user_id: user.id.clone(),
            }),
            None => Ok(()),
        }
    }

    fn assignment_keys<'a>(device_ids: impl IntoIterator<Item = Option<&'a str>>) -> Vec<QueryKey> {
        let mut keys = vec![QueryKey::List];
        keys.extend(device_ids.into_iter().flatten().map(Self::detail_key));
        keys
    }

    pub async fn create_end_user(&self, user: EndUserInsert) -> SyncResult<EndUser> {
        if let Some(device_id) = &user.device_id {
            self.ensure_unassigned(device_id, None).await?;
        }
        let created = self
            .end_users
            .create_end_user(user)
            .await
            .map_err(SyncError::remote("create_end_user"))?;
        self.refresh(Self::assignment_keys([created.device_id.as_deref()]))
            .await;
        Ok(created)
    }

    /// Update an end user. Assigning a new device moves the reference off the old one.
    pub async fn update_end_user(&self, id: &str, update: EndUserUpdate) -> SyncResult<EndUser> {
        if let Some(Some(device_id)) = &update.device_id {
            self.ensure_unassigned(device_id, Some(id)).await?;
        }
        let before = self
            .end_users
            .get_end_user(id)
            .await
            .map_err(SyncError::remote("get_end_user"))?;
        let updated = self
            .end_users
            .update_end_user(id, update)
            .await
            .map_err(SyncError::remote("update_end_user"))?;
        if before.device_id != updated.device_id {
            self.refresh(Self::assignment_keys([
                before.device_id.as_deref(),
                updated.device_id.as_deref(),
            ]))
            .await;
        }
        Ok(updated)
    }

    pub async fn delete_end_user(&self, id: &str) -> SyncResult<()> {
        let user = self
            .end_users
            .get_end_user(id)
            .await
            .map_err(SyncError::remote("get_end_user"))?;
        self.end_users
            .delete_end_user(id)
            .await
            .map_err(SyncError::remote("delete_end_user"))?;
        if user.device_id.is_some() {
            self.refresh(Self::assignment_keys([user.device_id.as_deref()]))
                .await;
        }
        Ok(())
    }

    /// Devices no end user is assigned to, ordered by name.
    pub async fn available_devices(&self) -> SyncResult<Vec<AvailableDevice>> {
        let devices = self.devices().await?;
        let users = self.end_users().await?;
        let assigned: HashSet<&str> = users
            .iter()
            .filter_map(|user| user.device_id.as_deref())
            .collect();
        let mut available: Vec<AvailableDevice> = devices
            .iter()
            .filter(|device| !assigned.contains(device.id.as_str()))
            .map(|device| AvailableDevice {
                id: device.id.clone(),
                name: device.name().to_string(),
            })
            .collect();
        available.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(available)
    }
}
