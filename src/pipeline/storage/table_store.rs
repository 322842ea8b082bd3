use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::app::ports::TableStore;
use crate::error::{RefineryError, Result};
use crate::pipeline::processing::correction::ValueTable;
use crate::pipeline::storage::json_file::write_json_atomic;

/// Value table persisted as a JSON array of `{state, action, value}` entries.
pub struct JsonFileTableStore {
    path: PathBuf,
}

impl JsonFileTableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl ToString) -> RefineryError {
        RefineryError::CorruptTable {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl TableStore for JsonFileTableStore {
    fn load(&self) -> Result<Option<ValueTable>> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No value table at {}, starting cold", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(self.corrupt(e)),
        };

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }

        let table: ValueTable = serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e))?;
        debug!("Loaded {} value table entries from {}", table.len(), self.path.display());
        Ok(Some(table))
    }

    fn save(&self, table: &ValueTable) -> Result<()> {
        write_json_atomic(&self.path, table)
            .map_err(|e| RefineryError::TablePersist(format!("{}: {}", self.path.display(), e)))
    }
}
