use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode workbook {file_name}: {source}")]
    Decode {
        file_name: String,
        #[source]
        source: calamine::Error,
    },
    #[error("failed to read sheet {sheet:?} of {file_name}: {source}")]
    Sheet {
        file_name: String,
        sheet: String,
        #[source]
        source: calamine::Error,
    },
    #[error("workbook {0} contains no sheets")]
    NoSheets(String),
    #[error("none of the selected sheets {selected:?} exist in {file_name}")]
    NoSheetsSelected {
        file_name: String,
        selected: Vec<String>,
    },
    #[error("import task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to build workbook: {0}")]
    Write(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("export task failed: {0}")]
    Task(String),
}
