use std::sync::Arc;

use inventory_model::{
    normalize_sheet_name, CellValue, Device, DeviceInfoPatch, DevicePatch, DeviceStatus,
};
use serde::{Deserialize, Serialize};

/// The persisted, undoable part of the store.
///
/// Devices are held behind `Arc` so snapshots share every device that an action did not touch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCollection {
    pub devices: Vec<Arc<Device>>,
    #[serde(default)]
    pub default_visible_sheets: Vec<String>,
}

/// One state transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Append devices as-is, in order.
    Append(Vec<Arc<Device>>),
    Remove(String),
    Update {
        id: String,
        patch: DevicePatch,
    },
    UpdateInfo {
        id: String,
        patch: DeviceInfoPatch,
    },
    SetVisibleSheets {
        id: String,
        sheets: Option<Vec<String>>,
    },
    SetStatus {
        id: String,
        status: DeviceStatus,
    },
    AddTag {
        id: String,
        tag: String,
    },
    RemoveTag {
        id: String,
        tag: String,
    },
    SetCell {
        id: String,
        sheet: String,
        row: usize,
        column: String,
        value: CellValue,
    },
    SetDefaultVisibleSheets(Vec<String>),
}

/// What an applied action did. Actions that change nothing produce no effect.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Changed,
    Removed(Arc<Device>),
}

/// A layer in the state stack.
pub trait StateCore {
    fn state(&self) -> &DeviceCollection;
    /// Apply `action`. `None` means the state is unchanged.
    fn dispatch(&mut self, action: Action) -> Option<Effect>;
    /// Swap in a whole snapshot (undo/redo, rehydration).
    fn replace(&mut self, state: DeviceCollection);
}

impl DeviceCollection {
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Device>> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    fn device_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices
            .iter_mut()
            .find(|d| d.id == id)
            .map(Arc::make_mut)
    }

    pub fn apply(&mut self, action: Action) -> Option<Effect> {
        match action {
            Action::Append(devices) => {
                if devices.is_empty() {
                    return None;
                }
                self.devices.extend(devices);
                Some(Effect::Changed)
            }
            Action::Remove(id) => {
                let pos = self.devices.iter().position(|d| d.id == id)?;
                Some(Effect::Removed(self.devices.remove(pos)))
            }
            Action::Update { id, patch } => {
                if patch.is_empty() {
                    return None;
                }
                patch.apply(self.device_mut(&id)?);
                Some(Effect::Changed)
            }
            Action::UpdateInfo { id, patch } => {
                if patch.is_empty() {
                    return None;
                }
                patch.apply(&mut self.device_mut(&id)?.device_info);
                Some(Effect::Changed)
            }
            Action::SetVisibleSheets { id, sheets } => {
                self.device_mut(&id)?.metadata.visible_sheets = sheets;
                Some(Effect::Changed)
            }
            Action::SetStatus { id, status } => {
                let device = self.get(&id)?;
                if device.status == status {
                    return None;
                }
                self.device_mut(&id)?.status = status;
                Some(Effect::Changed)
            }
            Action::AddTag { id, tag } => {
                let device = self.get(&id)?;
                let tag = tag.trim();
                if tag.is_empty() || device.metadata.tags.iter().any(|t| t == tag) {
                    return None;
                }
                self.device_mut(&id)?.metadata.add_tag(tag).then_some(Effect::Changed)
            }
            Action::RemoveTag { id, tag } => {
                let device = self.get(&id)?;
                if !device.metadata.tags.iter().any(|t| t == tag.trim()) {
                    return None;
                }
                self.device_mut(&id)?.metadata.remove_tag(&tag).then_some(Effect::Changed)
            }
            Action::SetCell {
                id,
                sheet,
                row,
                column,
                value,
            } => {
                let sheet = normalize_sheet_name(&sheet);
                let device = self.get(&id)?;
                let current = device.sheets.get(&sheet)?.get(row)?;
                if current.get(&column) == Some(&value) {
                    return None;
                }
                self.device_mut(&id)?
                    .sheets
                    .set_cell(&sheet, row, &column, value)
                    .then_some(Effect::Changed)
            }
            Action::SetDefaultVisibleSheets(sheets) => {
                self.default_visible_sheets = sheets;
                Some(Effect::Changed)
            }
        }
    }
}

impl StateCore for DeviceCollection {
    fn state(&self) -> &DeviceCollection {
        self
    }

    fn dispatch(&mut self, action: Action) -> Option<Effect> {
        self.apply(action)
    }

    fn replace(&mut self, state: DeviceCollection) {
        *self = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_model::{DeviceInfo, DeviceMetadata, Row, SheetMap};

    fn device(id: &str) -> Device {
        let row: Row = [("Product", "Office"), ("Seats", "5")].into_iter().collect();
        let sheets: SheetMap = [("license", vec![row])].into_iter().collect();
        Device {
            id: id.to_string(),
            status: Default::default(),
            device_info: DeviceInfo {
                name: id.to_uppercase(),
                ..Default::default()
            },
            file_name: format!("{id}.xlsx"),
            metadata: DeviceMetadata {
                total_sheets: 1,
                total_rows: 1,
                file_size: "1.0 KB".into(),
                imported_at: Default::default(),
                tags: Vec::new(),
                visible_sheets: None,
            },
            sheets,
        }
    }

    fn collection(ids: &[&str]) -> DeviceCollection {
        DeviceCollection {
            devices: ids.iter().map(|id| Arc::new(device(id))).collect(),
            default_visible_sheets: Vec::new(),
        }
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let mut state = collection(&["a"]);
        let before = state.clone();
        for action in [
            Action::Remove("zzz".into()),
            Action::SetStatus {
                id: "zzz".into(),
                status: DeviceStatus::Broken,
            },
            Action::AddTag {
                id: "zzz".into(),
                tag: "prod".into(),
            },
            Action::SetCell {
                id: "a".into(),
                sheet: "license".into(),
                row: 7,
                column: "Seats".into(),
                value: CellValue::from(1.0),
            },
        ] {
            assert_eq!(state.apply(action), None);
        }
        assert_eq!(state, before);
    }

    #[test]
    fn cell_edit_only_copies_the_touched_device() {
        let mut state = collection(&["a", "b"]);
        let before = state.clone();
        let effect = state.apply(Action::SetCell {
            id: "a".into(),
            sheet: "License".into(),
            row: 0,
            column: "Seats".into(),
            value: CellValue::from(10.0),
        });
        assert_eq!(effect, Some(Effect::Changed));
        assert!(Arc::ptr_eq(&before.devices[1], &state.devices[1]));
        assert!(!Arc::ptr_eq(&before.devices[0], &state.devices[0]));
        assert_eq!(
            before.devices[0].sheets.get("license").unwrap()[0].get("Seats"),
            Some(&CellValue::from("5"))
        );
        assert_eq!(
            state.devices[0].sheets.get("license").unwrap()[0].get("Seats"),
            Some(&CellValue::from(10.0))
        );
    }

    #[test]
    fn duplicate_tags_do_not_change_state() {
        let mut state = collection(&["a"]);
        let tag = |t: &str| Action::AddTag {
            id: "a".into(),
            tag: t.into(),
        };
        assert_eq!(state.apply(tag("prod")), Some(Effect::Changed));
        assert_eq!(state.apply(tag(" prod")), None);
        assert_eq!(state.apply(tag("")), None);
        assert_eq!(state.devices[0].metadata.tags, vec!["prod"]);
    }

    #[test]
    fn remove_returns_the_removed_device() {
        let mut state = collection(&["a", "b"]);
        match state.apply(Action::Remove("a".into())) {
            Some(Effect::Removed(device)) => assert_eq!(device.id, "a"),
            other => panic!("unexpected effect {other:?}"),
        }
        assert_eq!(state.len(), 1);
    }
}
