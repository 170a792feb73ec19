// src/main.rs
mod config;
mod extractors;
mod pipeline;
mod sources;
mod storage;
mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use config::Settings;
use pipeline::fertilizer::FertilizerOutcome;
use sources::SourceClient;
use storage::StorageManager;
use utils::AppError;

/// Downloads and normalizes Region VII agricultural datasets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    dataset: Dataset,

    /// Output directory for downloaded and derived files
    #[arg(short, long, default_value = "./data/raw", global = true)]
    output_dir: String,

    /// Overwrite existing output files
    #[arg(short, long, global = true)]
    force: bool,

    /// Debug mode - save the raw tables extracted from each bulletin
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Dataset {
    /// WFP rice price CSV
    Rice,
    /// FPA fertilizer bulletins, parsed into a monthly summary
    Fertilizer,
    /// PRISM yield and rice area figures
    Yield,
    /// Everything above, in order
    All,
}

impl Dataset {
    fn targets(self, settings: &Settings) -> Vec<PathBuf> {
        match self {
            Dataset::Rice => vec![settings.rice_prices_path()],
            Dataset::Fertilizer => vec![settings.fertilizer_aggregate_path()],
            Dataset::Yield => vec![settings.rice_area_path(), settings.yield_path()],
            Dataset::All => [Dataset::Rice, Dataset::Fertilizer, Dataset::Yield]
                .iter()
                .flat_map(|d| d.targets(settings))
                .collect(),
        }
    }
}

async fn fetch_rice(settings: &Settings) -> Result<(), AppError> {
    tracing::info!("Downloading WFP rice price dataset");
    let client = SourceClient::new(None)?;
    pipeline::rice::run(&client, settings).await?;
    Ok(())
}

async fn fetch_fertilizer(storage: &StorageManager, settings: &Settings) -> Result<(), AppError> {
    tracing::info!("Fetching & parsing FPA fertilizer data");
    // Bulletins can be large; no overall timeout on their downloads.
    let client = SourceClient::new(None)?;
    match pipeline::fertilizer::run(&client, storage, settings).await? {
        FertilizerOutcome::Written { path, rows } => {
            tracing::info!("Wrote {} monthly row(s) to {}", rows, path.display());
        }
        FertilizerOutcome::NoDocuments => tracing::warn!("Fertilizer summary not written: no bulletins found"),
        FertilizerOutcome::Empty(reason) => tracing::warn!("Fertilizer summary not written: {:?}", reason),
    }
    Ok(())
}

async fn fetch_yield(storage: &StorageManager, settings: &Settings) -> Result<(), AppError> {
    tracing::info!("Scraping PRISM yield & rice area data");
    let client = SourceClient::new(Some(settings.request_timeout))?;
    pipeline::yields::run(&client, storage, settings).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!("Starting processing for args: {:?}", args);

    let mut settings = Settings::new(&args.output_dir);
    settings.force = args.force;
    settings.debug = args.debug;

    // 3. Initialize storage
    let storage = StorageManager::new(&settings.output_dir)?;

    // 4. Refuse to overwrite earlier results unless asked to
    let existing = storage.existing(&args.dataset.targets(&settings));
    if !existing.is_empty() && !settings.force {
        tracing::warn!("The following files already exist in {}:", storage.base_dir().display());
        for file in &existing {
            tracing::warn!("  - {}", file.display());
        }
        tracing::warn!("Nothing done. Re-run with --force to overwrite them.");
        return Ok(());
    }

    // 5. Run the requested datasets; with `all`, a failing dataset does not stop the rest
    match args.dataset {
        Dataset::Rice => fetch_rice(&settings).await?,
        Dataset::Fertilizer => fetch_fertilizer(&storage, &settings).await?,
        Dataset::Yield => fetch_yield(&storage, &settings).await?,
        Dataset::All => {
            let mut failures = Vec::new();
            if let Err(e) = fetch_rice(&settings).await {
                tracing::error!("Rice prices failed: {}", e);
                failures.push("rice");
            }
            if let Err(e) = fetch_fertilizer(&storage, &settings).await {
                tracing::error!("Fertilizer prices failed: {}", e);
                failures.push("fertilizer");
            }
            if let Err(e) = fetch_yield(&storage, &settings).await {
                tracing::error!("Yield data failed: {}", e);
                failures.push("yield");
            }
            if !failures.is_empty() {
                return Err(AppError::Processing(format!("Failed datasets: {}", failures.join(", "))));
            }
        }
    }

    tracing::info!("Processing finished.");
    Ok(())
}
