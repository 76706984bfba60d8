use crate::device::{Device, DeviceStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestImport {
    pub device_id: String,
    pub name: String,
    pub imported_at: DateTime<Utc>,
}

/// Summary counters over a device collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStats {
    pub total_devices: usize,
    pub total_sheets: usize,
    pub total_rows: usize,
    pub active: usize,
    pub broken: usize,
    pub inactive: usize,
    pub latest_import: Option<LatestImport>,
}

impl DeviceStats {
    pub fn from_devices<'a>(devices: impl IntoIterator<Item = &'a Device>) -> Self {
        let mut stats = DeviceStats::default();
        for device in devices {
            stats.total_devices += 1;
            stats.total_sheets += device.metadata.total_sheets;
            stats.total_rows += device.metadata.total_rows;
            match device.status {
                DeviceStatus::Active => stats.active += 1,
                DeviceStatus::Broken => stats.broken += 1,
                DeviceStatus::Inactive => stats.inactive += 1,
            }
            let newer = stats
                .latest_import
                .as_ref()
                .map_or(true, |latest| device.metadata.imported_at > latest.imported_at);
            if newer {
                stats.latest_import = Some(LatestImport {
                    device_id: device.id.clone(),
                    name: device.device_info.name.clone(),
                    imported_at: device.metadata.imported_at,
                });
            }
        }
        stats
    }

    pub fn count(&self, status: DeviceStatus) -> usize {
        match status {
            DeviceStatus::Active => self.active,
            DeviceStatus::Broken => self.broken,
            DeviceStatus::Inactive => self.inactive,
        }
    }
}
