// src/storage/cache.rs
use std::fs;
use std::path::{Path, PathBuf};

use crate::extractors::record::ExtractedRecord;
use crate::storage::rows::CachedRecordRow;
use crate::utils::error::StorageError;

/// Per-document store of extracted records, keyed by document file name.
pub trait RecordCache {
    /// Records previously stored for the document, if any.
    fn load(&self, document_id: &str) -> Result<Option<Vec<ExtractedRecord>>, StorageError>;

    fn store(&mut self, document_id: &str, records: &[ExtractedRecord]) -> Result<(), StorageError>;
}

/// Keeps each document's records in a CSV file beside the document:
/// `WFP_March_2024.pdf` is cached as `WFP_March_2024.csv`.
#[derive(Debug, Clone)]
pub struct FileRecordCache {
    dir: PathBuf,
}

impl FileRecordCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path_for(&self, document_id: &str) -> PathBuf {
        self.dir.join(Path::new(document_id).with_extension("csv"))
    }
}

impl RecordCache for FileRecordCache {
    fn load(&self, document_id: &str) -> Result<Option<Vec<ExtractedRecord>>, StorageError> {
        let path = self.path_for(document_id);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let records = reader
            .deserialize::<CachedRecordRow>()
            .map(|row| row.map(ExtractedRecord::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(records))
    }

    fn store(&mut self, document_id: &str, records: &[ExtractedRecord]) -> Result<(), StorageError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }

        let path = self.path_for(document_id);
        let partial = path.with_extension("csv.part");
        {
            let mut writer = csv::Writer::from_path(&partial)?;
            for record in records {
                writer.serialize(CachedRecordRow::from(record))?;
            }
            writer.flush()?;
        }
        fs::rename(&partial, &path)?;

        tracing::debug!("Cached {} record(s) to {}", records.len(), path.display());
        Ok(())
    }
}

/// In-memory cache that counts writes.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryRecordCache {
    entries: std::collections::HashMap<String, Vec<ExtractedRecord>>,
    stores: usize,
}

#[cfg(test)]
impl MemoryRecordCache {
    pub fn stores(&self) -> usize {
        self.stores
    }
}

#[cfg(test)]
impl RecordCache for MemoryRecordCache {
    fn load(&self, document_id: &str) -> Result<Option<Vec<ExtractedRecord>>, StorageError> {
        Ok(self.entries.get(document_id).cloned())
    }

    fn store(&mut self, document_id: &str, records: &[ExtractedRecord]) -> Result<(), StorageError> {
        self.stores += 1;
        self.entries.insert(document_id.to_string(), records.to_vec());
        Ok(())
    }
}
