use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::record::Sku;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store rejected record {id}: {reason}")]
    Rejected { id: i64, reason: String },
}

/// Persistence facade the pipelines write through.
pub trait CatalogStore: Send + Sync {
    fn save(&self, sku: &Sku) -> Result<(), StorageError>;
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), StorageError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| StorageError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(StorageError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| StorageError::OutputDir(e.to_string()))?;
    }
    // Basic writability probe: try creating a temp file.
    NamedTempFile::new_in(dir).map_err(|e| StorageError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Keeps saved records in memory, in save order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    skus: Mutex<Vec<Sku>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Sku> {
        self.skus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.skus.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CatalogStore for MemoryStore {
    fn save(&self, sku: &Sku) -> Result<(), StorageError> {
        self.skus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sku.clone());
        Ok(())
    }
}

/// Appends one JSON object per record to `{dir}/{filename}`.
pub struct JsonLinesStore {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesStore {
    pub fn open(dir: &Path, filename: &str) -> Result<Self, StorageError> {
        ensure_output_dir(dir)?;
        let path = dir.join(filename);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }
}

impl CatalogStore for JsonLinesStore {
    fn save(&self, sku: &Sku) -> Result<(), StorageError> {
        let line = serde_json::to_string(sku)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl Drop for JsonLinesStore {
    fn drop(&mut self) {
        let _ = self
            .writer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .flush();
    }
}
