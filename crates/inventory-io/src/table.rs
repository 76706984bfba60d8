//! Worksheet → record conversion.
//!
//! The first row of the used range holds the column headers. Blank headers are named `__EMPTY`,
//! `__EMPTY_1`, …; repeated headers get `_1`, `_2`, … suffixes. Empty cells are left out of the
//! record and rows without any value are skipped.

use std::collections::HashSet;

use calamine::{Data, Range};
use inventory_model::{CellValue, Row};

const EMPTY_HEADER: &str = "__EMPTY";

pub(crate) fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        other => CellValue::Text(other.to_string()),
    }
}

pub(crate) fn header_names(cells: &[Data]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut empty_count = 0usize;
    let mut out = Vec::with_capacity(cells.len());

    for cell in cells {
        let text = cell_value(cell).display();
        let base = if text.is_empty() {
            let name = match empty_count {
                0 => EMPTY_HEADER.to_string(),
                n => format!("{EMPTY_HEADER}_{n}"),
            };
            empty_count += 1;
            name
        } else {
            text
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        seen.insert(name.clone());
        out.push(name);
    }
    out
}

pub(crate) fn range_to_rows(range: &Range<Data>) -> Vec<Row> {
    let mut rows = range.rows();
    let Some(header_cells) = rows.next() else {
        return Vec::new();
    };
    let headers = header_names(header_cells);

    rows.filter_map(|cells| {
        let row: Row = headers
            .iter()
            .zip(cells)
            .filter(|(_, cell)| !matches!(cell, Data::Empty))
            .map(|(header, cell)| (header.clone(), cell_value(cell)))
            .collect();
        (!row.is_empty()).then_some(row)
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_and_repeated_headers_are_renamed() {
        let cells = vec![
            Data::String("IP".into()),
            Data::Empty,
            Data::String("IP".into()),
            Data::Empty,
            Data::Int(2024),
            Data::String("IP".into()),
        ];
        assert_eq!(
            header_names(&cells),
            vec!["IP", "__EMPTY", "IP_1", "__EMPTY_1", "2024", "IP_2"]
        );
    }

    #[test]
    fn rows_skip_empty_cells_and_blank_rows() {
        let mut range = Range::new((0, 0), (3, 2));
        range.set_value((0, 0), Data::String("Product".into()));
        range.set_value((0, 1), Data::String("Seats".into()));
        range.set_value((0, 2), Data::String("Active".into()));
        range.set_value((1, 0), Data::String("Office".into()));
        range.set_value((1, 1), Data::Float(5.0));
        range.set_value((3, 2), Data::Bool(true));

        let rows = range_to_rows(&range);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Product"), Some(&CellValue::from("Office")));
        assert_eq!(rows[0].get("Seats"), Some(&CellValue::Number(5.0)));
        assert_eq!(rows[0].get("Active"), None);
        assert_eq!(rows[1].columns().collect::<Vec<_>>(), vec!["Active"]);
    }

    #[test]
    fn empty_range_has_no_rows() {
        let range: Range<Data> = Range::empty();
        assert!(range_to_rows(&range).is_empty());
    }
}
