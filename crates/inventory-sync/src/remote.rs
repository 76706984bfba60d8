use async_trait::async_trait;
use inventory_model::{CellValue, DeviceStats, Row};

use crate::error::RemoteResult;
use crate::rows::{
    DeviceRow, DeviceRowInsert, DeviceRowPatch, DeviceWithSheets, EndUser, EndUserInsert,
    EndUserUpdate, NewSheetRow, SheetOrder, SheetRow,
};

/// CRUD collaborator for device rows and their child sheet rows.
///
/// Sheet mutations address sheets by remote row id. Implementations own server-computed
/// fields such as `updated_at`.
#[async_trait]
pub trait DeviceRemote: Send + Sync {
    async fn get_devices(&self) -> RemoteResult<Vec<DeviceRow>>;

    async fn get_device_with_sheets(&self, id: &str) -> RemoteResult<DeviceWithSheets>;

    async fn get_device_stats(&self) -> RemoteResult<DeviceStats>;

    async fn create_device(&self, device: DeviceRowInsert) -> RemoteResult<DeviceRow>;

    /// Create a device row together with its sheets in one call.
    async fn import_device(
        &self,
        device: DeviceRowInsert,
        sheets: Vec<NewSheetRow>,
    ) -> RemoteResult<DeviceRow>;

    async fn update_device(&self, id: &str, patch: DeviceRowPatch) -> RemoteResult<DeviceRow>;

    async fn update_device_visible_sheets(
        &self,
        id: &str,
        visible_sheets: Vec<String>,
    ) -> RemoteResult<DeviceRow>;

    /// Delete a device row and its sheets.
    async fn delete_device(&self, id: &str) -> RemoteResult<()>;

    async fn create_sheet(&self, device_id: &str, sheet: NewSheetRow) -> RemoteResult<SheetRow>;

    async fn update_sheet_data(&self, sheet_id: &str, rows: Vec<Row>) -> RemoteResult<SheetRow>;

    async fn update_sheet_cell(
        &self,
        sheet_id: &str,
        row_index: usize,
        column: &str,
        value: CellValue,
    ) -> RemoteResult<SheetRow>;

    async fn rename_sheet(&self, sheet_id: &str, name: &str) -> RemoteResult<SheetRow>;

    async fn delete_sheet(&self, sheet_id: &str) -> RemoteResult<()>;

    async fn reorder_sheets(&self, order: Vec<SheetOrder>) -> RemoteResult<()>;

    async fn add_row(&self, sheet_id: &str, row: Row) -> RemoteResult<SheetRow>;

    async fn delete_row(&self, sheet_id: &str, row_index: usize) -> RemoteResult<SheetRow>;
}

/// CRUD collaborator for end users, the people devices are assigned to.
#[async_trait]
pub trait EndUserRemote: Send + Sync {
    async fn get_end_users(&self) -> RemoteResult<Vec<EndUser>>;

    async fn get_end_user(&self, id: &str) -> RemoteResult<EndUser>;

    async fn create_end_user(&self, user: EndUserInsert) -> RemoteResult<EndUser>;

    async fn update_end_user(&self, id: &str, update: EndUserUpdate) -> RemoteResult<EndUser>;

    async fn delete_end_user(&self, id: &str) -> RemoteResult<()>;

    /// Release every assignment of `device_id`. Returns how many end users were updated.
    async fn clear_device_reference(&self, device_id: &str) -> RemoteResult<usize>;
}
