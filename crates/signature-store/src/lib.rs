//! Persistence for the saved-signature history and baked documents.
//!
//! The history is a most-recently-used list of captured signature images,
//! capacity-bounded, stored as one JSON document under a fixed file name in
//! the platform data directory. Every mutation rewrites the full collection
//! synchronously, so the file always reflects the in-memory ordering.

pub mod data_url;

use directories::ProjectDirs;
use log::debug;
use overlay_model::SignatureRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const HISTORY_SCHEMA_VERSION: u32 = 1;
const HISTORY_FILE: &str = "signatures.json";

/// The history keeps at most this many records; adding beyond the cap drops
/// the least recently used record.
pub const HISTORY_CAPACITY: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SignatureStore {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryEnvelope {
    version: u32,
    signatures: Vec<SignatureRecord>,
}

impl SignatureStore {
    pub fn from_default_project() -> Result<Self, StoreError> {
        let dirs =
            ProjectDirs::from("dev", "Inkseal", "Inkseal").ok_or(StoreError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Saved signatures, most recent first.
    pub fn list(&self) -> Result<Vec<SignatureRecord>, StoreError> {
        let path = self.history_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let bytes = fs::read(path)?;
        let envelope: HistoryEnvelope = serde_json::from_slice(&bytes)?;

        Ok(envelope.signatures)
    }

    /// Creates a record for the captured image, prepends it, and truncates
    /// the history to [`HISTORY_CAPACITY`].
    pub fn add(&self, data_url: impl Into<String>) -> Result<SignatureRecord, StoreError> {
        let record = SignatureRecord {
            id: Uuid::new_v4().to_string(),
            data_url: data_url.into(),
            timestamp: epoch_millis(),
        };

        let mut records = self.list()?;
        records.insert(0, record.clone());

        if records.len() > HISTORY_CAPACITY {
            debug!(
                "signature history at capacity, evicting {} record(s)",
                records.len() - HISTORY_CAPACITY
            );
            records.truncate(HISTORY_CAPACITY);
        }

        self.persist(&records)?;

        Ok(record)
    }

    /// Reorders an existing record to the front; id, image data, and
    /// timestamp are untouched. Unknown ids are a no-op.
    pub fn promote(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.list()?;

        let Some(index) = records.iter().position(|record| record.id == id) else {
            return Ok(());
        };
        if index == 0 {
            return Ok(());
        }

        let record = records.remove(index);
        records.insert(0, record);
        self.persist(&records)
    }

    /// Deletes a record by id. Unknown ids are a no-op.
    pub fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.list()?;

        let count = records.len();
        records.retain(|record| record.id != id);
        if records.len() == count {
            return Ok(());
        }

        self.persist(&records)
    }

    fn persist(&self, records: &[SignatureRecord]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;

        let envelope =
            HistoryEnvelope { version: HISTORY_SCHEMA_VERSION, signatures: records.to_vec() };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        write_atomic(&self.history_path(), &bytes)
    }

    fn history_path(&self) -> PathBuf {
        self.root.join(HISTORY_FILE)
    }
}

/// Persists baked document bytes. The write goes through a sibling temp file
/// and a rename, so a failed or interrupted bake never leaves a partially
/// written document visible.
pub fn write_document(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    write_atomic(path, bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.persist(path).map_err(|error| StoreError::Io(error.error))?;

    Ok(())
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
