use std::path::Path;

use inventory_model::format_file_size;

use crate::ImportError;

/// An uploaded workbook: its original file name plus the raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkbookFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl WorkbookFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a workbook from disk. The file name (without directories) becomes [`Self::name`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self { name, bytes })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn formatted_size(&self) -> String {
        format_file_size(self.size())
    }
}
