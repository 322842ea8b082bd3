use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::ports::BlobStore;
use crate::constants::{ASSET_ID_PREFIX, BLOB_EXTENSION};
use crate::error::{RefineryError, Result};
use crate::pipeline::storage::json_file::write_json_atomic;
use crate::types::RefinedRecord;

const MAX_ID_ATTEMPTS: usize = 8;

/// Blob store writing one `<key>.blob` JSON file per artifact under `root`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", key, BLOB_EXTENSION))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, content: &serde_json::Value) -> Result<String> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        let bytes = serde_json::to_vec_pretty(content)?;

        // create_new: an existing artifact is never overwritten
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        if let Err(e) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }
        Ok(path.display().to_string())
    }
}

/// Refined record fields before an `asset_id` has been assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactDraft {
    pub original_text_masked: String,
    pub refined_rating: f64,
    pub rating_imputed: f64,
    pub original_rating: Option<f64>,
    pub timestamp: String,
}

impl ArtifactDraft {
    pub fn into_record(self, asset_id: String) -> RefinedRecord {
        RefinedRecord {
            asset_id,
            original_text_masked: self.original_text_masked,
            refined_rating: self.refined_rating,
            rating_imputed: self.rating_imputed,
            original_rating: self.original_rating,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub record: RefinedRecord,
    pub location: String,
}

/// Assigns asset ids, writes per-record artifacts and the consolidated final collection.
pub struct ArtifactStore {
    blobs: Arc<dyn BlobStore>,
    final_file: PathBuf,
    /// Every id handed out by this store. Unbounded: ids are never reused for the process lifetime.
    issued_ids: Mutex<HashSet<String>>,
    final_file_lock: Mutex<()>,
}

impl ArtifactStore {
    pub fn new(blobs: Arc<dyn BlobStore>, final_file: impl Into<PathBuf>) -> Self {
        Self {
            blobs,
            final_file: final_file.into(),
            issued_ids: Mutex::new(HashSet::new()),
            final_file_lock: Mutex::new(()),
        }
    }

    pub fn final_file(&self) -> &Path {
        &self.final_file
    }

    /// Generate an id never handed out before by this store.
    pub fn next_asset_id(&self) -> String {
        let mut issued = self.issued_ids.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            let uuid = Uuid::new_v4().simple().to_string();
            let candidate = format!("{}{}", ASSET_ID_PREFIX, &uuid[..8]);
            if issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Persist a draft as a new artifact under a freshly generated id.
    ///
    /// An id already present in the blob store is skipped in favour of a new id.
    pub fn store(&self, draft: ArtifactDraft) -> Result<StoredArtifact> {
        let mut last_reason = String::new();
        for _ in 0..MAX_ID_ATTEMPTS {
            let asset_id = self.next_asset_id();
            let record = draft.clone().into_record(asset_id.clone());
            let content = serde_json::to_value(&record)?;

            match self.blobs.put(&asset_id, &content) {
                Ok(location) => {
                    debug!("Stored artifact {} at {}", asset_id, location);
                    crate::observability::metrics::artifacts::artifact_written();
                    return Ok(StoredArtifact { record, location });
                }
                Err(RefineryError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!("Artifact id {} already taken, regenerating", asset_id);
                    last_reason = e.to_string();
                }
                Err(e) => {
                    crate::observability::metrics::artifacts::artifact_write_failed();
                    return Err(RefineryError::ArtifactWrite {
                        asset_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        crate::observability::metrics::artifacts::artifact_write_failed();
        Err(RefineryError::ArtifactWrite {
            asset_id: String::from("<unassigned>"),
            reason: format!("no free asset id after {} attempts: {}", MAX_ID_ATTEMPTS, last_reason),
        })
    }

    /// Replace the consolidated collection with `records`. Serialized across batches.
    pub fn write_final(&self, records: &[RefinedRecord]) -> Result<PathBuf> {
        let _guard = self.final_file_lock.lock().unwrap_or_else(|p| p.into_inner());
        write_json_atomic(&self.final_file, records)?;
        info!(
            "Wrote {} refined records to {}",
            records.len(),
            self.final_file.display()
        );
        Ok(self.final_file.clone())
    }
}
