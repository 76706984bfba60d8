use crate::value::CellValue;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One record of a sheet: `(column header, value)` pairs in source column order.
///
/// Rows are not homogeneous; two rows of the same sheet may carry different columns.
/// Serializes as a JSON object whose key order matches the column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Set `column` to `value`, keeping the column's position if it already exists
    /// and appending it otherwise. Returns the previous value.
    pub fn set(&mut self, column: impl Into<String>, value: CellValue) -> Option<CellValue> {
        let column = column.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.cells.push((column, value));
                None
            }
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<CellValue> {
        let idx = self.cells.iter().position(|(name, _)| name == column)?;
        Some(self.cells.remove(idx).1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value.into());
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of column -> scalar value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::new();
                while let Some((column, value)) = access.next_entry::<String, serde_json::Value>()? {
                    row.set(column, CellValue::from_json(&value));
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// Ordered union of the columns used by `rows`, in first-appearance order.
pub fn column_union<'a>(rows: impl IntoIterator<Item = &'a Row>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for row in rows {
        for column in row.columns() {
            if !out.iter().any(|c| c == column) {
                out.push(column.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_keeps_column_position() {
        let mut row: Row = [("A", 1.0), ("B", 2.0)].into_iter().collect();
        assert_eq!(row.set("A", CellValue::Number(5.0)), Some(CellValue::Number(1.0)));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(row.set("C", CellValue::Null), None);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    }

    #[test]
    fn json_object_order_is_preserved() {
        let json = r#"{"zeta":1,"alpha":"x","mid":true}"#;
        let row: Row = serde_json::from_str(json).unwrap();
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"zeta":1.0,"alpha":"x","mid":true}"#);
    }

    #[test]
    fn nested_json_degrades_to_text() {
        let row: Row = serde_json::from_str(r#"{"list":[1,2]}"#).unwrap();
        assert_eq!(row.get("list"), Some(&CellValue::Text("[1,2]".into())));
    }

    #[test]
    fn column_union_is_first_appearance_ordered() {
        let a: Row = [("x", 1.0), ("y", 2.0)].into_iter().collect();
        let b: Row = [("z", 1.0), ("x", 2.0)].into_iter().collect();
        assert_eq!(column_union([&a, &b]), vec!["x", "y", "z"]);
    }
}
