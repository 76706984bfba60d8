use crate::device::{Device, DeviceInfo, DeviceMetadata, DeviceStatus};
use crate::sheets::SheetMap;
use serde::{Deserialize, Serialize};

/// Shallow partial update of a [`Device`]: every `Some` field replaces the device's field
/// wholesale. The id is not patchable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevicePatch {
    pub status: Option<DeviceStatus>,
    pub device_info: Option<DeviceInfo>,
    pub file_name: Option<String>,
    pub sheets: Option<SheetMap>,
    pub metadata: Option<DeviceMetadata>,
}

impl DevicePatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.device_info.is_none()
            && self.file_name.is_none()
            && self.sheets.is_none()
            && self.metadata.is_none()
    }

    pub fn apply(self, device: &mut Device) {
        if let Some(status) = self.status {
            device.status = status;
        }
        if let Some(info) = self.device_info {
            device.device_info = info;
        }
        if let Some(file_name) = self.file_name {
            device.file_name = file_name;
        }
        if let Some(sheets) = self.sheets {
            device.sheets = sheets;
        }
        if let Some(metadata) = self.metadata {
            device.metadata = metadata;
        }
    }
}

/// Field-level partial update of [`DeviceInfo`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceInfoPatch {
    pub name: Option<String>,
    pub os: Option<String>,
    pub cpu: Option<String>,
    pub ram: Option<String>,
    pub architecture: Option<String>,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub last_update: Option<String>,
}

impl DeviceInfoPatch {
    pub fn is_empty(&self) -> bool {
        self == &DeviceInfoPatch::default()
    }

    pub fn apply(&self, info: &mut DeviceInfo) {
        let fields = [
            (&self.name, &mut info.name),
            (&self.os, &mut info.os),
            (&self.cpu, &mut info.cpu),
            (&self.ram, &mut info.ram),
            (&self.architecture, &mut info.architecture),
            (&self.ip, &mut info.ip),
            (&self.mac, &mut info.mac),
            (&self.last_update, &mut info.last_update),
        ];
        for (patch, slot) in fields {
            if let Some(value) = patch {
                *slot = value.clone();
            }
        }
    }
}
