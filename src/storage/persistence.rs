//! File-backed persistence for the defaults record
//!
//! The record is written as MessagePack to a temp file in the same directory,
//! synced, and atomically renamed over the previous version.

use super::engine::{DefaultsStore, DurabilityContract};
use crate::core::{DEFAULTS_DOCUMENT_ID, OpTime, Result, RwDefaultsDocument, RwcError};
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const DEFAULTS_FILE_NAME: &str = "read_write_concern_defaults.msgpack";
const RECORD_FORMAT_VERSION: u32 = 1;

// A single-node store is its own voting majority and never changes term.
const FILE_STORE_TERM: i64 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredDefaultsRecord {
    #[serde(rename = "_id")]
    id: String,
    version: u32,
    document: RwDefaultsDocument,
}

/// Durable single-node store for the defaults record.
pub struct FileDefaultsStore {
    path: PathBuf,
    // Held by the blocking writer itself, so a save abandoned by its caller
    // still finishes before the next read-modify-write starts.
    write_lock: Arc<Mutex<()>>,
}

impl FileDefaultsStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).map_err(|e| {
            RwcError::IoError(format!("Failed to create data directory: {}", e))
        })?;
        Ok(Self {
            path: data_dir.join(DEFAULTS_FILE_NAME),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read_record(path: &Path) -> Result<Option<RwDefaultsDocument>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut file = File::open(path)
            .map_err(|e| RwcError::IoError(format!("Failed to open defaults record: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| RwcError::IoError(format!("Failed to read defaults record: {}", e)))?;
        let record: StoredDefaultsRecord = rmp_serde::from_slice(&data).map_err(|e| {
            RwcError::ExecutionError(format!("Failed to deserialize defaults record: {}", e))
        })?;
        if record.id != DEFAULTS_DOCUMENT_ID {
            return Err(RwcError::ExecutionError(format!(
                "Defaults record has unexpected _id '{}'",
                record.id
            )));
        }
        if record.version != RECORD_FORMAT_VERSION {
            warn!(
                "defaults record format version {} differs from {}",
                record.version, RECORD_FORMAT_VERSION
            );
        }
        Ok(Some(record.document))
    }

    fn write_record(path: &Path, document: RwDefaultsDocument) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| RwcError::IoError("Defaults record has no parent directory".into()))?;
        let record = StoredDefaultsRecord {
            id: DEFAULTS_DOCUMENT_ID.to_string(),
            version: RECORD_FORMAT_VERSION,
            document,
        };
        let serialized = rmp_serde::to_vec_named(&record).map_err(|e| {
            RwcError::ExecutionError(format!("Failed to serialize defaults record: {}", e))
        })?;

        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| RwcError::IoError(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(&serialized)
            .map_err(|e| RwcError::IoError(format!("Failed to write defaults record: {}", e)))?;
        temp.flush()
            .map_err(|e| RwcError::IoError(format!("Failed to flush defaults record: {}", e)))?;
        temp.as_file().sync_all().map_err(|e| {
            RwcError::PersistenceUnavailable(format!("Failed to sync defaults record: {}", e))
        })?;
        temp.persist(path).map_err(|e| {
            RwcError::PersistenceUnavailable(format!("Failed to rename defaults record: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl DefaultsStore for FileDefaultsStore {
    async fn load(&self) -> Result<Option<RwDefaultsDocument>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_record(&path))
            .await
            .map_err(|e| RwcError::ExecutionError(format!("Defaults read task failed: {}", e)))?
    }

    async fn save(
        &self,
        document: &RwDefaultsDocument,
        _durability: DurabilityContract,
    ) -> Result<OpTime> {
        let write_lock = Arc::clone(&self.write_lock);
        let path = self.path.clone();
        let mut document = document.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = write_lock.lock()?;
            let previous = Self::read_record(&path)?.and_then(|doc| doc.update_op_time);
            let op_time = OpTime::next_in_term(previous, FILE_STORE_TERM);
            document.update_op_time = Some(op_time);
            Self::write_record(&path, document)?;
            Ok(op_time)
        })
        .await
        .map_err(|e| RwcError::ExecutionError(format!("Defaults write task failed: {}", e)))?
    }
}
