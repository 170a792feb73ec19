// src/config.rs
use std::path::PathBuf;
use std::time::Duration;

// --- Source Endpoints ---
pub const WFP_RICE_URL: &str = "https://data.humdata.org/dataset/ea251823-8694-47b4-82d0-7d27f00e8aba/resource/9a842d72-0d7d-4922-ad0e-eb8106c1ab0e/download/wfp_food_prices_phl.csv";
pub const FPA_LISTING_URL: &str = "https://fpa.da.gov.ph/weekly-prices/";
pub const PRISM_BASE_URL: &str = "https://prism.philrice.gov.ph/wp-dynamicreports/map/";

// --- Target Region ---
/// Substring that identifies the target region in bulletin region labels.
pub const TARGET_REGION: &str = "REGION VII";
/// Label of the target region in PRISM tables.
pub const PRISM_REGION_LABEL: &str = "Region VII";
pub const PRISM_REGION_CODE: u32 = 7;

// --- Output Files ---
pub const RICE_PRICES_FILE: &str = "wfp_food_prices_phl.csv";
pub const FERTILIZER_AGGREGATE_FILE: &str = "region_7_monthly_fertilizer_prices.csv";
pub const RICE_AREA_FILE: &str = "rice_area.csv";
pub const YIELD_FILE: &str = "yield.csv";
pub const FERTILIZER_PDF_DIR: &str = "fertilizer_pdfs";

// PRISM answers slowly; keep a bound on every request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub rice_url: String,
    pub listing_url: String,
    pub prism_url: String,
    pub target_region: String,
    pub request_timeout: Duration,
    pub prism_years: Vec<i32>,
    pub force: bool,
    pub debug: bool,
}

impl Settings {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            rice_url: WFP_RICE_URL.to_string(),
            listing_url: FPA_LISTING_URL.to_string(),
            prism_url: PRISM_BASE_URL.to_string(),
            target_region: TARGET_REGION.to_string(),
            request_timeout: REQUEST_TIMEOUT,
            prism_years: (2018..=2026).rev().collect(),
            force: false,
            debug: false,
        }
    }

    pub fn rice_prices_path(&self) -> PathBuf {
        self.output_dir.join(RICE_PRICES_FILE)
    }

    pub fn fertilizer_aggregate_path(&self) -> PathBuf {
        self.output_dir.join(FERTILIZER_AGGREGATE_FILE)
    }

    pub fn rice_area_path(&self) -> PathBuf {
        self.output_dir.join(RICE_AREA_FILE)
    }

    pub fn yield_path(&self) -> PathBuf {
        self.output_dir.join(YIELD_FILE)
    }
}
