use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use inventory_model::{column_union, CellValue, Device, Row};
use rust_xlsxwriter::{Workbook as XlsxWorkbook, Worksheet, XlsxError};

use crate::ExportError;

/// Upper bound for auto-sized column widths, in characters.
pub const MAX_COLUMN_WIDTH: usize = 50;

const MAX_SHEET_NAME_CHARS: usize = 31;
const INVALID_SHEET_NAME_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];
const INVALID_FILE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// A serialized `.xlsx` workbook and the file name it should be saved under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedWorkbook {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportedWorkbook {
    /// Atomically write the workbook into `dir`, returning the full path.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
        let path = dir.as_ref().join(&self.file_name);
        inventory_fs::atomic_write_bytes(&path, &self.bytes).map_err(|source| {
            ExportError::Io {
                path: path.clone(),
                source,
            }
        })?;
        Ok(path)
    }
}

/// `<display name>_<YYYY-MM-DD>.xlsx`, with characters that are not valid in file names replaced.
pub fn export_file_name(device: &Device, date: NaiveDate) -> String {
    let name: String = device
        .name()
        .trim()
        .chars()
        .map(|c| {
            if INVALID_FILE_NAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let name = if name.is_empty() { "device" } else { &name };
    format!("{name}_{}.xlsx", date.format("%Y-%m-%d"))
}

/// Column widths for a sheet: the longest of the header and every stringified value, capped at
/// [`MAX_COLUMN_WIDTH`].
pub fn column_widths(headers: &[String], rows: &[Row]) -> Vec<usize> {
    headers
        .iter()
        .map(|header| {
            rows.iter()
                .filter_map(|row| row.get(header))
                .map(|value| value.display().chars().count())
                .fold(header.chars().count(), usize::max)
                .min(MAX_COLUMN_WIDTH)
        })
        .collect()
}

/// Excel-legal worksheet names for `names`, in order and unique (case-insensitively).
pub fn excel_sheet_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let mut base: String = name
                .chars()
                .map(|c| {
                    if INVALID_SHEET_NAME_CHARS.contains(&c) {
                        '_'
                    } else {
                        c
                    }
                })
                .collect();
            base = base.trim_matches('\'').to_string();
            if base.trim().is_empty() || base.eq_ignore_ascii_case("history") {
                base = format!("{base}_sheet");
            }

            let mut candidate = truncate_chars(&base, MAX_SHEET_NAME_CHARS);
            let mut n = 2;
            while used.contains(&candidate.to_lowercase()) {
                let suffix = format!("_{n}");
                let room = MAX_SHEET_NAME_CHARS - suffix.chars().count();
                candidate = format!("{}{suffix}", truncate_chars(&base, room));
                n += 1;
            }
            used.insert(candidate.to_lowercase());
            candidate
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn xlsx_err(err: XlsxError) -> ExportError {
    ExportError::Write(format!("{err:?}"))
}

fn write_sheet(worksheet: &mut Worksheet, rows: &[Row]) -> Result<(), XlsxError> {
    let headers = column_union(rows);
    for (col, (header, width)) in headers.iter().zip(column_widths(&headers, rows)).enumerate() {
        let col = col as u16;
        worksheet.write_string(0, col, header)?;
        worksheet.set_column_width(col, width as f64)?;
    }

    for (row_idx, row) in rows.iter().enumerate() {
        let excel_row = row_idx as u32 + 1;
        for (col, header) in headers.iter().enumerate() {
            let col = col as u16;
            match row.get(header) {
                None | Some(CellValue::Null) => {}
                Some(CellValue::Bool(b)) => {
                    worksheet.write_boolean(excel_row, col, *b)?;
                }
                Some(CellValue::Number(n)) => {
                    worksheet.write_number(excel_row, col, *n)?;
                }
                Some(CellValue::Text(s)) => {
                    worksheet.write_string(excel_row, col, s)?;
                }
            }
        }
    }
    Ok(())
}

/// Serialize `device` as an `.xlsx` workbook named with `date`.
///
/// One worksheet per sheet table in the device's sheet order. Sheets with no rows become empty
/// worksheets.
pub fn export_device_on(device: &Device, date: NaiveDate) -> Result<ExportedWorkbook, ExportError> {
    let mut out = XlsxWorkbook::new();
    let sheet_names = excel_sheet_names(device.sheets.names());

    for ((_, rows), sheet_name) in device.sheets.iter().zip(&sheet_names) {
        let worksheet = out.add_worksheet();
        worksheet.set_name(sheet_name).map_err(xlsx_err)?;
        write_sheet(worksheet, rows).map_err(xlsx_err)?;
    }
    if device.sheets.is_empty() {
        // A workbook needs at least one worksheet.
        out.add_worksheet();
    }

    let bytes = out.save_to_buffer().map_err(xlsx_err)?;
    let file_name = export_file_name(device, date);
    log::info!("exported device {} as {file_name} ({} bytes)", device.id, bytes.len());
    Ok(ExportedWorkbook { file_name, bytes })
}

/// [`export_device_on`] dated with today's local date.
pub fn export_device(device: &Device) -> Result<ExportedWorkbook, ExportError> {
    export_device_on(device, Local::now().date_naive())
}

pub async fn export_device_async(device: Device) -> Result<ExportedWorkbook, ExportError> {
    tokio::task::spawn_blocking(move || export_device(&device))
        .await
        .map_err(|e| ExportError::Task(e.to_string()))?
}
