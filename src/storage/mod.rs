// src/storage/mod.rs
pub mod cache;
pub mod rows;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::extractors::classify::Table;
use crate::extractors::record::PRODUCTS;
use crate::pipeline::aggregate::{CorpusStats, MonthlyAggregate};
use crate::storage::rows::AggregateRow;
use crate::utils::error::StorageError;

pub use cache::FileRecordCache;

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Creates (if needed) and returns a subdirectory of the base directory.
    pub fn subdir(&self, name: &str) -> Result<PathBuf, StorageError> {
        let dir = self.base_dir.join(name);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    /// The subset of `paths` that already exist.
    pub fn existing(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths.iter().filter(|p| p.exists()).cloned().collect()
    }

    /// Writes rows as CSV with a header line, replacing any existing file.
    pub fn write_csv<T: Serialize>(&self, file_name: &str, rows: &[T]) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(file_name);

        let mut writer = csv::Writer::from_path(&file_path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        tracing::info!("Saved {} row(s) to {}", rows.len(), file_path.display());
        Ok(file_path)
    }

    /// Saves the monthly fertilizer aggregate.
    pub fn save_aggregate(&self, file_name: &str, monthly: &[MonthlyAggregate]) -> Result<PathBuf, StorageError> {
        let rows: Vec<AggregateRow> = monthly.iter().map(AggregateRow::from).collect();
        self.write_csv(file_name, &rows)
    }

    /// Saves metadata about an aggregation run in JSON format, next to the aggregate.
    pub fn save_run_metadata(
        &self,
        file_name: &str,
        documents: usize,
        stats: &CorpusStats,
        monthly: &[MonthlyAggregate],
    ) -> Result<PathBuf, StorageError> {
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());
        let file_path = self.base_dir.join(format!("{}_meta.json", stem));

        let metadata = serde_json::json!({
            "aggregate_file": file_name,
            "products": PRODUCTS,
            "documents": documents,
            "documents_parsed": stats.parsed,
            "documents_cached": stats.cached,
            "documents_without_records": stats.empty,
            "documents_failed": stats.failed,
            "records": stats.records,
            "monthly_rows": monthly.len(),
            "first_month": monthly.iter().map(|m| m.date).min().map(|d| d.to_string()),
            "last_month": monthly.iter().map(|m| m.date).max().map(|d| d.to_string()),
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, metadata_str)
            .map_err(StorageError::IoError)?;

        tracing::info!("Saved metadata to {}", file_path.display());
        Ok(file_path)
    }
}

/// Writes the raw tables of a document as JSON, for inspecting how a bulletin
/// was laid out before classification.
pub fn save_table_dump(path: &Path, document_id: &str, pages: &[Vec<Table>]) -> Result<(), StorageError> {
    let dump = serde_json::json!({
        "document": document_id,
        "pages": pages,
    });
    let text = serde_json::to_string_pretty(&dump)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    fs::write(path, text)?;
    tracing::info!("Saved table dump to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_aggregate_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("out")).unwrap();
        let monthly = vec![MonthlyAggregate {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            region: "REGION VII".to_string(),
            province: "Cebu".to_string(),
            prices: [Some(150.0), None, None, None, None, None, Some(2000.5)],
        }];

        let path = storage.save_aggregate("agg.csv", &monthly).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(
            text,
            "Date,Year,Month,Region,Province,Urea_Prilled,Urea_Granular,Ammosul,Complete,Ammophos,MOP,DAP\n\
             2024-03-01,2024,March,REGION VII,Cebu,150.0,,,,,,2000.5\n"
        );
    }

    #[test]
    fn test_run_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let stats = CorpusStats { cached: 1, parsed: 2, empty: 0, failed: 1, records: 10 };
        let path = storage.save_run_metadata("region.csv", 4, &stats, &[]).unwrap();
        assert_eq!(path.file_name().unwrap(), "region_meta.json");

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["documents"], 4);
        assert_eq!(value["documents_failed"], 1);
        assert_eq!(value["first_month"], serde_json::Value::Null);
        assert_eq!(value["products"][6], "DAP");
    }

    #[test]
    fn test_existing_and_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let pdfs = storage.subdir("fertilizer_pdfs").unwrap();
        assert!(pdfs.is_dir());

        let present = dir.path().join("yield.csv");
        std::fs::write(&present, "x").unwrap();
        let missing = dir.path().join("rice_area.csv");
        assert_eq!(storage.existing(&[present.clone(), missing]), vec![present]);
    }

    #[test]
    fn test_table_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.tables.json");
        let pages = vec![vec![vec![vec![Some("Cebu".to_string()), None]]]];
        save_table_dump(&path, "doc.pdf", &pages).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["pages"][0][0][0][0], "Cebu");
        assert!(value["pages"][0][0][0][1].is_null());
    }
}
