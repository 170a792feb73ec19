// src/pipeline/yields.rs
use std::path::PathBuf;

use crate::config::{Settings, RICE_AREA_FILE, YIELD_FILE};
use crate::sources::client::SourceClient;
use crate::sources::models::{RiceAreaRecord, YieldRecord};
use crate::sources::prism;
use crate::storage::StorageManager;
use crate::utils::error::AppError;

/// Writes whichever PRISM series came back non-empty.
pub fn write_reports(
    storage: &StorageManager,
    areas: &[RiceAreaRecord],
    yields: &[YieldRecord],
) -> Result<Vec<PathBuf>, AppError> {
    let mut written = Vec::new();

    if areas.is_empty() {
        tracing::warn!("No rice area figures returned; {} not written", RICE_AREA_FILE);
    } else {
        written.push(storage.write_csv(RICE_AREA_FILE, areas)?);
    }

    if yields.is_empty() {
        tracing::warn!("No yield figures returned; {} not written", YIELD_FILE);
    } else {
        written.push(storage.write_csv(YIELD_FILE, yields)?);
    }

    Ok(written)
}

/// Scrapes rice area and yield for the target region from PRISM.
pub async fn run(
    client: &SourceClient,
    storage: &StorageManager,
    settings: &Settings,
) -> Result<Vec<PathBuf>, AppError> {
    let (areas, yields) = prism::collect_reports(client, settings).await;
    tracing::info!("PRISM returned {} rice area and {} yield figure(s)", areas.len(), yields.len());
    write_reports(storage, &areas, &yields)
}
