//! A process-local collaborator that keeps remote rows in memory.
//!
//! It follows the same contract a hosted backend does: ids and timestamps are assigned on
//! write, a device can be held by at most one end user, and deleting a device leaves end-user
//! references for the caller to release. Individual operations can be made to fail, which is
//! how the adapter's rollback paths are exercised.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use inventory_model::{CellValue, DeviceStats, Row};

use crate::error::{RemoteError, RemoteResult};
use crate::remote::{DeviceRemote, EndUserRemote};
use crate::rows::{
    DeviceRow, DeviceRowInsert, DeviceRowPatch, DeviceWithSheets, EndUser, EndUserInsert,
    EndUserUpdate, NewSheetRow, SheetOrder, SheetRow,
};
use crate::translate::device_from_row;

const CLOCK_START: i64 = 1_735_689_600;

#[derive(Default)]
struct Tables {
    devices: Vec<DeviceRow>,
    sheets: Vec<SheetRow>,
    end_users: Vec<EndUser>,
    next_id: u64,
    ticks: i64,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Server clock: strictly increasing, one second per write.
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        Utc.timestamp_opt(CLOCK_START + self.ticks, 0)
            .single()
            .unwrap_or_default()
    }

    fn device_mut(&mut self, id: &str) -> RemoteResult<&mut DeviceRow> {
        self.devices
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| RemoteError::NotFound(format!("device {id}")))
    }

    fn sheet_mut(&mut self, id: &str) -> RemoteResult<&mut SheetRow> {
        self.sheets
            .iter_mut()
            .find(|sheet| sheet.id == id)
            .ok_or_else(|| RemoteError::NotFound(format!("sheet {id}")))
    }

    fn end_user_mut(&mut self, id: &str) -> RemoteResult<&mut EndUser> {
        self.end_users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or_else(|| RemoteError::NotFound(format!("end user {id}")))
    }

    fn touch_device(&mut self, id: &str) {
        let now = self.now();
        if let Ok(device) = self.device_mut(id) {
            device.updated_at = now;
        }
    }

    fn insert_device(&mut self, insert: DeviceRowInsert) -> DeviceRow {
        let now = self.now();
        let row = DeviceRow {
            id: self.next_id("dev"),
            name: insert.name,
            os: insert.os,
            cpu: insert.cpu,
            ram: insert.ram,
            architecture: insert.architecture,
            ip: insert.ip,
            mac: insert.mac,
            last_update: insert.last_update,
            status: insert.status,
            file_name: insert.file_name,
            file_size: insert.file_size,
            tags: insert.tags,
            visible_sheets: insert.visible_sheets,
            imported_at: insert.imported_at,
            total_sheets: insert.total_sheets,
            total_rows: insert.total_rows,
            end_user_id: None,
            created_at: now,
            updated_at: now,
        };
        self.devices.push(row.clone());
        row
    }

    fn insert_sheet(&mut self, device_id: &str, sheet: NewSheetRow) -> SheetRow {
        let row = SheetRow {
            id: self.next_id("sheet"),
            device_id: device_id.to_string(),
            sheet_name: sheet.sheet_name,
            sheet_data: sheet.sheet_data,
            sort_order: sheet.sort_order,
        };
        self.sheets.push(row.clone());
        row
    }

    /// Apply `edit` to a sheet and bump its device's `updated_at`.
    fn edit_sheet(
        &mut self,
        sheet_id: &str,
        edit: impl FnOnce(&mut SheetRow) -> RemoteResult<()>,
    ) -> RemoteResult<SheetRow> {
        let sheet = self.sheet_mut(sheet_id)?;
        edit(sheet)?;
        let sheet = sheet.clone();
        self.touch_device(&sheet.device_id);
        Ok(sheet)
    }

    fn holder_of(&self, device_id: &str) -> Option<&EndUser> {
        self.end_users
            .iter()
            .find(|user| user.device_id.as_deref() == Some(device_id))
    }

    fn set_device_holder(&mut self, device_id: &str, end_user_id: Option<String>) {
        if let Ok(device) = self.device_mut(device_id) {
            device.end_user_id = end_user_id;
        }
    }
}

#[derive(Default)]
pub struct InMemoryRemote {
    tables: Mutex<Tables>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<&'static str>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` (a trait method name such as `"update_sheet_cell"`) fail with
    /// [`RemoteError::Unavailable`] until cleared.
    pub fn set_failing(&self, operation: &str, failing: bool) {
        let mut set = self.failing.lock().expect("failure set mutex poisoned");
        if failing {
            set.insert(operation.to_string());
        } else {
            set.remove(operation);
        }
    }

    /// Names of the operations called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("call log mutex poisoned").clone()
    }

    pub fn device_row(&self, id: &str) -> Option<DeviceRow> {
        self.tables().devices.iter().find(|row| row.id == id).cloned()
    }

    pub fn sheet_rows(&self, device_id: &str) -> Vec<SheetRow> {
        self.tables()
            .sheets
            .iter()
            .filter(|sheet| sheet.device_id == device_id)
            .cloned()
            .collect()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("remote tables mutex poisoned")
    }

    /// Record the call and fail it if injection is on. Returns the table guard.
    fn begin(&self, operation: &'static str) -> RemoteResult<MutexGuard<'_, Tables>> {
        self.calls
            .lock()
            .expect("call log mutex poisoned")
            .push(operation);
        let failing = self
            .failing
            .lock()
            .expect("failure set mutex poisoned")
            .contains(operation);
        if failing {
            return Err(RemoteError::Unavailable(format!(
                "injected failure in {operation}"
            )));
        }
        Ok(self.tables())
    }
}

#[async_trait]
impl DeviceRemote for InMemoryRemote {
    async fn get_devices(&self) -> RemoteResult<Vec<DeviceRow>> {
        Ok(self.begin("get_devices")?.devices.clone())
    }

    async fn get_device_with_sheets(&self, id: &str) -> RemoteResult<DeviceWithSheets> {
        let mut tables = self.begin("get_device_with_sheets")?;
        let device = tables.device_mut(id)?.clone();
        let sheets = tables
            .sheets
            .iter()
            .filter(|sheet| sheet.device_id == id)
            .cloned()
            .collect();
        Ok(DeviceWithSheets { device, sheets })
    }

    async fn get_device_stats(&self) -> RemoteResult<DeviceStats> {
        let tables = self.begin("get_device_stats")?;
        let devices: Vec<_> = tables.devices.iter().map(device_from_row).collect();
        Ok(DeviceStats::from_devices(&devices))
    }

    async fn create_device(&self, device: DeviceRowInsert) -> RemoteResult<DeviceRow> {
        Ok(self.begin("create_device")?.insert_device(device))
    }

    async fn import_device(
        &self,
        device: DeviceRowInsert,
        sheets: Vec<NewSheetRow>,
    ) -> RemoteResult<DeviceRow> {
        let mut tables = self.begin("import_device")?;
        let row = tables.insert_device(device);
        for sheet in sheets {
            tables.insert_sheet(&row.id, sheet);
        }
        Ok(row)
    }

    async fn update_device(&self, id: &str, patch: DeviceRowPatch) -> RemoteResult<DeviceRow> {
        let mut tables = self.begin("update_device")?;
        let now = tables.now();
        let row = tables.device_mut(id)?;
        patch.apply(row);
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn update_device_visible_sheets(
        &self,
        id: &str,
        visible_sheets: Vec<String>,
    ) -> RemoteResult<DeviceRow> {
        let mut tables = self.begin("update_device_visible_sheets")?;
        let now = tables.now();
        let row = tables.device_mut(id)?;
        row.visible_sheets = Some(visible_sheets);
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn delete_device(&self, id: &str) -> RemoteResult<()> {
        let mut tables = self.begin("delete_device")?;
        tables.device_mut(id)?;
        tables.devices.retain(|row| row.id != id);
        tables.sheets.retain(|sheet| sheet.device_id != id);
        Ok(())
    }

    async fn create_sheet(&self, device_id: &str, sheet: NewSheetRow) -> RemoteResult<SheetRow> {
        let mut tables = self.begin("create_sheet")?;
        tables.device_mut(device_id)?;
        let row = tables.insert_sheet(device_id, sheet);
        tables.touch_device(device_id);
        Ok(row)
    }

    async fn update_sheet_data(&self, sheet_id: &str, rows: Vec<Row>) -> RemoteResult<SheetRow> {
        self.begin("update_sheet_data")?.edit_sheet(sheet_id, |sheet| {
            sheet.sheet_data = rows;
            Ok(())
        })
    }

    async fn update_sheet_cell(
        &self,
        sheet_id: &str,
        row_index: usize,
        column: &str,
        value: CellValue,
    ) -> RemoteResult<SheetRow> {
        self.begin("update_sheet_cell")?.edit_sheet(sheet_id, |sheet| {
            let row = sheet.sheet_data.get_mut(row_index).ok_or_else(|| {
                RemoteError::Rejected(format!("row {row_index} out of range"))
            })?;
            row.set(column, value);
            Ok(())
        })
    }

    async fn rename_sheet(&self, sheet_id: &str, name: &str) -> RemoteResult<SheetRow> {
        self.begin("rename_sheet")?.edit_sheet(sheet_id, |sheet| {
            sheet.sheet_name = name.to_string();
            Ok(())
        })
    }

    async fn delete_sheet(&self, sheet_id: &str) -> RemoteResult<()> {
        let mut tables = self.begin("delete_sheet")?;
        let device_id = tables.sheet_mut(sheet_id)?.device_id.clone();
        tables.sheets.retain(|sheet| sheet.id != sheet_id);
        tables.touch_device(&device_id);
        Ok(())
    }

    async fn reorder_sheets(&self, order: Vec<SheetOrder>) -> RemoteResult<()> {
        let mut tables = self.begin("reorder_sheets")?;
        for entry in &order {
            tables.sheet_mut(&entry.id)?;
        }
        for entry in order {
            let sheet = tables.sheet_mut(&entry.id)?;
            sheet.sort_order = entry.sort_order;
            let device_id = sheet.device_id.clone();
            tables.touch_device(&device_id);
        }
        Ok(())
    }

    async fn add_row(&self, sheet_id: &str, row: Row) -> RemoteResult<SheetRow> {
        self.begin("add_row")?.edit_sheet(sheet_id, |sheet| {
            sheet.sheet_data.push(row);
            Ok(())
        })
    }

    async fn delete_row(&self, sheet_id: &str, row_index: usize) -> RemoteResult<SheetRow> {
        self.begin("delete_row")?.edit_sheet(sheet_id, |sheet| {
            if row_index >= sheet.sheet_data.len() {
                return Err(RemoteError::Rejected(format!("row {row_index} out of range")));
            }
            sheet.sheet_data.remove(row_index);
            Ok(())
        })
    }
}

#[async_trait]
impl EndUserRemote for InMemoryRemote {
    async fn get_end_users(&self) -> RemoteResult<Vec<EndUser>> {
        Ok(self.begin("get_end_users")?.end_users.clone())
    }

    async fn get_end_user(&self, id: &str) -> RemoteResult<EndUser> {
        Ok(self.begin("get_end_user")?.end_user_mut(id)?.clone())
    }

    async fn create_end_user(&self, user: EndUserInsert) -> RemoteResult<EndUser> {
        let mut tables = self.begin("create_end_user")?;
        if let Some(device_id) = &user.device_id {
            tables.device_mut(device_id)?;
            if let Some(holder) = tables.holder_of(device_id) {
                return Err(RemoteError::Rejected(format!(
                    "device {device_id} is already assigned to {}",
                    holder.id
                )));
            }
        }
        let now = tables.now();
        let created = EndUser {
            id: tables.next_id("user"),
            device_id: user.device_id,
            full_name: user.full_name,
            email: user.email,
            phone: user.phone,
            department: user.department,
            position: user.position,
            notes: user.notes,
            created_at: now,
            updated_at: now,
        };
        if let Some(device_id) = &created.device_id {
            tables.set_device_holder(device_id, Some(created.id.clone()));
        }
        tables.end_users.push(created.clone());
        Ok(created)
    }

    async fn update_end_user(&self, id: &str, update: EndUserUpdate) -> RemoteResult<EndUser> {
        let mut tables = self.begin("update_end_user")?;
        let previous_device = tables.end_user_mut(id)?.device_id.clone();
        if let Some(Some(device_id)) = &update.device_id {
            tables.device_mut(device_id)?;
            if let Some(holder) = tables.holder_of(device_id).filter(|holder| holder.id != id) {
                return Err(RemoteError::Rejected(format!(
                    "device {device_id} is already assigned to {}",
                    holder.id
                )));
            }
        }

        let now = tables.now();
        let user = tables.end_user_mut(id)?;
        update.apply(user);
        user.updated_at = now;
        let user = user.clone();

        if previous_device != user.device_id {
            if let Some(old) = &previous_device {
                tables.set_device_holder(old, None);
            }
            if let Some(new) = &user.device_id {
                tables.set_device_holder(new, Some(user.id.clone()));
            }
        }
        Ok(user)
    }

    async fn delete_end_user(&self, id: &str) -> RemoteResult<()> {
        let mut tables = self.begin("delete_end_user")?;
        let device_id = tables.end_user_mut(id)?.device_id.clone();
        tables.end_users.retain(|user| user.id != id);
        if let Some(device_id) = device_id {
            tables.set_device_holder(&device_id, None);
        }
        Ok(())
    }

    async fn clear_device_reference(&self, device_id: &str) -> RemoteResult<usize> {
        let mut tables = self.begin("clear_device_reference")?;
        let now = tables.now();
        let mut released = 0;
        for user in tables
            .end_users
            .iter_mut()
            .filter(|user| user.device_id.as_deref() == Some(device_id))
        {
            user.device_id = None;
            user.updated_at = now;
            released += 1;
        }
        tables.set_device_holder(device_id, None);
        Ok(released)
    }
}
