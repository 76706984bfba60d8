use crate::row::Row;
use crate::value::CellValue;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// All sheet tables of a device, keyed by normalized sheet name, in workbook order.
///
/// Serializes as a JSON object (`{"license": [...], "ram": [...]}`) whose key order is the
/// sheet order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SheetMap {
    entries: Vec<(String, Vec<Row>)>,
}

impl SheetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sheets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of rows across all sheets.
    pub fn total_rows(&self) -> usize {
        self.entries.iter().map(|(_, rows)| rows.len()).sum()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&[Row]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, rows)| rows.as_slice())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Vec<Row>> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, rows)| rows)
    }

    /// The first sheet in workbook order.
    pub fn first(&self) -> Option<(&str, &[Row])> {
        self.entries
            .first()
            .map(|(name, rows)| (name.as_str(), rows.as_slice()))
    }

    /// Insert or replace a sheet. A replaced sheet keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, rows: Vec<Row>) -> Option<Vec<Row>> {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, rows)),
            None => {
                self.entries.push((name, rows));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<Row>> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Row])> {
        self.entries
            .iter()
            .map(|(name, rows)| (name.as_str(), rows.as_slice()))
    }

    /// Replace a single cell. Returns `false` (and leaves the map untouched) when the sheet or
    /// row does not exist.
    pub fn set_cell(
        &mut self,
        sheet: &str,
        row_index: usize,
        column: &str,
        value: CellValue,
    ) -> bool {
        match self.get_mut(sheet).and_then(|rows| rows.get_mut(row_index)) {
            Some(row) => {
                row.set(column, value);
                true
            }
            None => false,
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<Row>)> for SheetMap {
    fn from_iter<I: IntoIterator<Item = (K, Vec<Row>)>>(iter: I) -> Self {
        let mut map = SheetMap::new();
        for (name, rows) in iter {
            map.insert(name, rows);
        }
        map
    }
}

impl Serialize for SheetMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, rows) in &self.entries {
            map.serialize_entry(name, rows)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SheetMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SheetMapVisitor;

        impl<'de> Visitor<'de> for SheetMapVisitor {
            type Value = SheetMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of sheet name -> row array")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SheetMap, A::Error> {
                let mut sheets = SheetMap::new();
                while let Some((name, rows)) = access.next_entry::<String, Vec<Row>>()? {
                    sheets.insert(name, rows);
                }
                Ok(sheets)
            }
        }

        deserializer.deserialize_map(SheetMapVisitor)
    }
}
