// src/pipeline/fertilizer.rs
use std::path::{Path, PathBuf};

use crate::config::{Settings, FERTILIZER_AGGREGATE_FILE, FERTILIZER_PDF_DIR};
use crate::extractors::pdf::PdfDocument;
use crate::pipeline::aggregate::{AggregateOutcome, CorpusAggregator};
use crate::storage::{FileRecordCache, StorageManager};
use crate::utils::error::{AppError, SourceError};

/// Where bulletins come from: a listing page of links, and the documents behind them.
#[allow(async_fn_in_trait)]
pub trait DocumentFetcher {
    /// Unique bulletin URLs linked from the listing page.
    async fn discover(&self, listing_url: &str) -> Result<Vec<String>, SourceError>;

    /// Local copy of a bulletin, downloaded into `dir` unless already there.
    async fn fetch(&self, url: &str, dir: &Path) -> Result<PathBuf, SourceError>;
}

#[derive(Debug, PartialEq)]
pub enum FertilizerOutcome {
    NoDocuments,
    Empty(AggregateOutcome),
    Written { path: PathBuf, rows: usize },
}

/// Discovers, downloads and parses the fertilizer bulletins, then writes the
/// monthly summary for the target region.
///
/// Missing links, unreadable documents and empty results are reported and
/// leave the output untouched; only failing to write the summary is an error.
pub async fn run<F: DocumentFetcher>(
    fetcher: &F,
    storage: &StorageManager,
    settings: &Settings,
) -> Result<FertilizerOutcome, AppError> {
    let pdf_dir = storage.subdir(FERTILIZER_PDF_DIR)?;

    let links = match fetcher.discover(&settings.listing_url).await {
        Ok(links) => links,
        Err(e) => {
            tracing::error!("Error fetching links: {}", e);
            Vec::new()
        }
    };
    if links.is_empty() {
        tracing::warn!("No PDF links found on {}", settings.listing_url);
        return Ok(FertilizerOutcome::NoDocuments);
    }
    tracing::info!("Found {} PDF links. Downloading...", links.len());

    let mut documents = Vec::with_capacity(links.len());
    for link in &links {
        match fetcher.fetch(link, &pdf_dir).await {
            // With --debug, each bulletin that actually gets parsed leaves a table dump.
            Ok(path) => documents.push(PdfDocument::new(path).with_table_dump(settings.debug)),
            Err(e) => tracing::warn!("Failed to download {}: {}", link, e),
        }
    }

    let mut aggregator = CorpusAggregator::new(FileRecordCache::new(&pdf_dir), settings.target_region.as_str());
    let (outcome, stats) = aggregator.run(&documents);

    match outcome {
        AggregateOutcome::Aggregated(monthly) => {
            let path = storage.save_aggregate(FERTILIZER_AGGREGATE_FILE, &monthly)?;
            if let Err(e) = storage.save_run_metadata(FERTILIZER_AGGREGATE_FILE, documents.len(), &stats, &monthly) {
                tracing::warn!("Failed to save run metadata: {}", e);
            }
            tracing::info!("Aggregated {} fertilizer data saved to: {}", settings.target_region, path.display());
            Ok(FertilizerOutcome::Written { path, rows: monthly.len() })
        }
        AggregateOutcome::NoRecords => {
            tracing::warn!("No data extracted.");
            Ok(FertilizerOutcome::Empty(AggregateOutcome::NoRecords))
        }
        other => {
            tracing::warn!("No {} data found after extraction.", settings.target_region);
            Ok(FertilizerOutcome::Empty(other))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::pdf::write_test_pdf;

    /// Serves a fixed set of links; documents are expected to be in place already.
    struct LocalFetcher {
        links: Vec<String>,
    }

    impl DocumentFetcher for LocalFetcher {
        async fn discover(&self, _listing_url: &str) -> Result<Vec<String>, SourceError> {
            Ok(self.links.clone())
        }

        async fn fetch(&self, url: &str, dir: &Path) -> Result<PathBuf, SourceError> {
            let name = url.rsplit('/').next().unwrap_or_default();
            let path = dir.join(name);
            if path.exists() {
                Ok(path)
            } else {
                Err(SourceError::Parse(format!("not available offline: {}", url)))
            }
        }
    }

    struct FailingFetcher;

    impl DocumentFetcher for FailingFetcher {
        async fn discover(&self, listing_url: &str) -> Result<Vec<String>, SourceError> {
            Err(SourceError::Parse(format!("listing unavailable: {}", listing_url)))
        }

        async fn fetch(&self, url: &str, _dir: &Path) -> Result<PathBuf, SourceError> {
            Err(SourceError::Parse(url.to_string()))
        }
    }

    fn setup() -> (tempfile::TempDir, StorageManager, Settings) {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let settings = Settings::new(dir.path());
        (dir, storage, settings)
    }

    fn write_bulletins(pdf_dir: &Path) {
        std::fs::create_dir_all(pdf_dir).unwrap();
        write_test_pdf(&pdf_dir.join("WFP_March_2024.pdf"), &[vec![
            vec!["REGION VII", "1,600"],
            vec!["Cebu", "1,500", "2,000"],
            vec!["Bohol", "1,400"],
            vec!["Negros\nOriental", "1,250"],
            vec!["AVE", "1,450"],
            vec!["REGION VI", "1,700"],
            vec!["Iloilo", "1,710"],
        ]]);
        write_test_pdf(&pdf_dir.join("WFP_Weekly_March_2024_wk2.pdf"), &[vec![
            vec!["REGION VII", "1,600"],
            vec!["Cebu", "1,700"],
        ]]);
        write_test_pdf(&pdf_dir.join("WFP_Feb_2024.pdf"), &[vec![
            vec!["REGION VII", "1,600"],
            vec!["Cebu", "1,300"],
        ]]);
        write_test_pdf(&pdf_dir.join("Fertilizer_Notes.pdf"), &[vec![
            vec!["REGION VII", "1,600"],
            vec!["Cebu", "9,999"],
        ]]);
    }

    fn links() -> Vec<String> {
        [
            "WFP_Feb_2024.pdf",
            "WFP_March_2024.pdf",
            "WFP_Weekly_March_2024_wk2.pdf",
            "Fertilizer_Notes.pdf",
            "missing_June_2024.pdf",
        ]
        .iter()
        .map(|name| format!("https://fpa.da.gov.ph/wp-content/uploads/{}", name))
        .collect()
    }

    #[test]
    fn test_no_links_writes_nothing() {
        let (dir, storage, settings) = setup();
        let outcome = tokio_test::block_on(run(&FailingFetcher, &storage, &settings)).unwrap();
        assert_eq!(outcome, FertilizerOutcome::NoDocuments);
        assert!(!dir.path().join(FERTILIZER_AGGREGATE_FILE).exists());
    }

    #[test]
    fn test_no_regional_rows_writes_nothing() {
        let (dir, storage, settings) = setup();
        let pdf_dir = dir.path().join(FERTILIZER_PDF_DIR);
        std::fs::create_dir_all(&pdf_dir).unwrap();
        write_test_pdf(&pdf_dir.join("WFP_May_2024.pdf"), &[vec![
            vec!["CARAGA", "1,600"],
            vec!["Agusan del Norte", "1,500"],
        ]]);

        let fetcher = LocalFetcher { links: vec!["https://fpa.da.gov.ph/WFP_May_2024.pdf".to_string()] };
        let outcome = tokio_test::block_on(run(&fetcher, &storage, &settings)).unwrap();
        assert_eq!(outcome, FertilizerOutcome::Empty(AggregateOutcome::NoRegionalRows));
        assert!(!dir.path().join(FERTILIZER_AGGREGATE_FILE).exists());
    }

    #[test]
    fn test_end_to_end_and_rerun_is_byte_identical() {
        let (dir, storage, settings) = setup();
        let pdf_dir = dir.path().join(FERTILIZER_PDF_DIR);
        write_bulletins(&pdf_dir);
        let fetcher = LocalFetcher { links: links() };

        let outcome = tokio_test::block_on(run(&fetcher, &storage, &settings)).unwrap();
        let path = match outcome {
            FertilizerOutcome::Written { path, rows } => {
                assert_eq!(rows, 4);
                path
            }
            other => panic!("unexpected outcome {:?}", other),
        };
        let first = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            first,
            "Date,Year,Month,Region,Province,Urea_Prilled,Urea_Granular,Ammosul,Complete,Ammophos,MOP,DAP\n\
             2024-02-01,2024,February,REGION VII,Cebu,1300.0,,,,,,\n\
             2024-03-01,2024,March,REGION VII,Bohol,1400.0,,,,,,\n\
             2024-03-01,2024,March,REGION VII,Cebu,1600.0,2000.0,,,,,\n\
             2024-03-01,2024,March,REGION VII,Negros Oriental,1250.0,,,,,,\n"
        );
        assert!(pdf_dir.join("WFP_March_2024.csv").exists());
        assert!(dir.path().join("region_7_monthly_fertilizer_prices_meta.json").exists());

        // Second run reads the caches, even once the bulletins are unreadable.
        for name in ["WFP_Feb_2024.pdf", "WFP_March_2024.pdf", "WFP_Weekly_March_2024_wk2.pdf"] {
            std::fs::write(pdf_dir.join(name), b"not a pdf").unwrap();
        }
        tokio_test::block_on(run(&fetcher, &storage, &settings)).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_debug_dumps_only_parsed_bulletins() {
        let (dir, storage, mut settings) = setup();
        settings.debug = true;
        let pdf_dir = dir.path().join(FERTILIZER_PDF_DIR);
        write_bulletins(&pdf_dir);

        let fetcher = LocalFetcher { links: links() };
        tokio_test::block_on(run(&fetcher, &storage, &settings)).unwrap();
        let dumps = ["WFP_Feb_2024.tables.json", "WFP_March_2024.tables.json", "WFP_Weekly_March_2024_wk2.tables.json"];
        for name in dumps {
            assert!(pdf_dir.join(name).exists(), "missing {}", name);
        }
        // Undated bulletins are never opened, so they leave no dump.
        assert!(!pdf_dir.join("Fertilizer_Notes.tables.json").exists());
        let dump = std::fs::read_to_string(pdf_dir.join("WFP_March_2024.tables.json")).unwrap();
        assert!(dump.contains("Negros\\nOriental"));

        // A rerun is served from the record caches and parses nothing.
        for name in dumps {
            std::fs::remove_file(pdf_dir.join(name)).unwrap();
        }
        tokio_test::block_on(run(&fetcher, &storage, &settings)).unwrap();
        for name in dumps {
            assert!(!pdf_dir.join(name).exists(), "re-dumped {}", name);
        }
    }
}
