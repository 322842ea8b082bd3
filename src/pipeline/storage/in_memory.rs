use std::collections::HashMap;
use std::io::{Error as IoError, ErrorKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::app::ports::{BlobStore, TableStore};
use crate::error::{RefineryError, Result};
use crate::pipeline::processing::correction::ValueTable;

/// In-memory value table store for development/testing
#[derive(Default)]
pub struct InMemoryTableStore {
    table: Mutex<Option<ValueTable>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: ValueTable) -> Self {
        Self {
            table: Mutex::new(Some(table)),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Option<ValueTable> {
        self.table.lock().unwrap().clone()
    }
}

impl TableStore for InMemoryTableStore {
    fn load(&self) -> Result<Option<ValueTable>> {
        Ok(self.table.lock().unwrap().clone())
    }

    fn save(&self, table: &ValueTable) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RefineryError::TablePersist("simulated save failure".to_string()));
        }
        *self.table.lock().unwrap() = Some(table.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory blob store for development/testing
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, serde_json::Value>>,
    failing: AtomicBool,
    fail_keys_containing: Mutex<Option<String>>,
    pending_collisions: AtomicUsize,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail every put whose content's masked text contains `needle`.
    pub fn fail_when_text_contains(&self, needle: &str) {
        *self.fail_keys_containing.lock().unwrap() = Some(needle.to_string());
    }

    /// Report the next `n` puts as already existing.
    pub fn reject_next_puts_as_existing(&self, n: usize) {
        self.pending_collisions.store(n, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.blobs.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, key: &str, content: &serde_json::Value) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(IoError::new(ErrorKind::Other, "simulated blob failure").into());
        }
        if let Some(needle) = self.fail_keys_containing.lock().unwrap().as_deref() {
            let text = content["original_text_masked"].as_str().unwrap_or_default();
            if text.contains(needle) {
                return Err(IoError::new(ErrorKind::Other, "simulated blob failure").into());
            }
        }
        let pending = self.pending_collisions.load(Ordering::SeqCst);
        if pending > 0 {
            self.pending_collisions.store(pending - 1, Ordering::SeqCst);
            return Err(IoError::new(ErrorKind::AlreadyExists, "key exists").into());
        }

        let mut blobs = self.blobs.lock().unwrap();
        if blobs.contains_key(key) {
            return Err(IoError::new(ErrorKind::AlreadyExists, "key exists").into());
        }
        blobs.insert(key.to_string(), content.clone());
        Ok(format!("memory://{}", key))
    }
}
