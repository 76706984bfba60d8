use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Reader, Sheets};
use chrono::Utc;
use inventory_model::{new_device_id, normalize_sheet_name, Device, DeviceMetadata, SheetMap};

use crate::identity::extract_device_info;
use crate::table::range_to_rows;
use crate::{ImportError, WorkbookFile};

type WorkbookReader<'a> = Sheets<Cursor<&'a [u8]>>;

fn open(file: &WorkbookFile) -> Result<WorkbookReader<'_>, ImportError> {
    open_workbook_auto_from_rs(Cursor::new(file.bytes.as_slice())).map_err(|source| {
        ImportError::Decode {
            file_name: file.name.clone(),
            source,
        }
    })
}

/// Normalized sheet names in workbook order, without reading any cell data.
pub fn scan_sheet_names(file: &WorkbookFile) -> Result<Vec<String>, ImportError> {
    let workbook = open(file)?;
    Ok(workbook
        .sheet_names()
        .iter()
        .map(|name| normalize_sheet_name(name))
        .collect())
}

/// Decode `file` into a new [`Device`].
///
/// With `selected_sheets`, only sheets whose normalized name matches one of the (normalized)
/// selections are read. Any decode failure rejects the whole file.
pub fn parse_workbook(
    file: &WorkbookFile,
    selected_sheets: Option<&[String]>,
) -> Result<Device, ImportError> {
    log::debug!("parsing workbook {} ({} bytes)", file.name, file.bytes.len());
    let mut workbook = open(file)?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_owned();
    if sheet_names.is_empty() {
        return Err(ImportError::NoSheets(file.name.clone()));
    }

    let selection: Option<Vec<String>> =
        selected_sheets.map(|names| names.iter().map(|n| normalize_sheet_name(n)).collect());

    let mut sheets = SheetMap::new();
    for sheet_name in sheet_names {
        let normalized = normalize_sheet_name(&sheet_name);
        if let Some(selection) = &selection {
            if !selection.contains(&normalized) {
                continue;
            }
        }

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|source| ImportError::Sheet {
                file_name: file.name.clone(),
                sheet: sheet_name.clone(),
                source,
            })?;
        let rows = range_to_rows(&range);
        if sheets.insert(normalized.clone(), rows).is_some() {
            log::warn!(
                "{}: sheet {sheet_name:?} normalizes to {normalized:?}, replacing an earlier sheet",
                file.name
            );
        }
    }

    if sheets.is_empty() {
        return Err(ImportError::NoSheetsSelected {
            file_name: file.name.clone(),
            selected: selection.unwrap_or_default(),
        });
    }

    let device_info = extract_device_info(&sheets, &file.name);
    let metadata = DeviceMetadata {
        total_sheets: sheets.len(),
        total_rows: sheets.total_rows(),
        file_size: file.formatted_size(),
        imported_at: Utc::now(),
        tags: Vec::new(),
        visible_sheets: None,
    };
    log::info!(
        "parsed {}: {} sheets, {} rows",
        file.name,
        metadata.total_sheets,
        metadata.total_rows
    );

    Ok(Device {
        id: new_device_id(),
        status: Default::default(),
        device_info,
        file_name: file.name.clone(),
        sheets,
        metadata,
    })
}

pub async fn scan_sheet_names_async(file: WorkbookFile) -> Result<Vec<String>, ImportError> {
    tokio::task::spawn_blocking(move || scan_sheet_names(&file))
        .await
        .map_err(|e| ImportError::Task(e.to_string()))?
}

/// [`parse_workbook`] on the blocking thread pool.
pub async fn parse_workbook_async(
    file: WorkbookFile,
    selected_sheets: Option<Vec<String>>,
) -> Result<Device, ImportError> {
    tokio::task::spawn_blocking(move || parse_workbook(&file, selected_sheets.as_deref()))
        .await
        .map_err(|e| ImportError::Task(e.to_string()))?
}
