// src/pipeline/rice.rs
use std::path::PathBuf;

use crate::config::Settings;
use crate::sources::client::SourceClient;
use crate::utils::error::AppError;

/// Downloads the WFP food price CSV as published, replacing any previous copy.
pub async fn run(client: &SourceClient, settings: &Settings) -> Result<PathBuf, AppError> {
    let path = settings.rice_prices_path();
    let bytes = client.download_to(&settings.rice_url, &path).await?;
    tracing::info!("Saved {} bytes of rice prices to: {}", bytes, path.display());
    Ok(path)
}
