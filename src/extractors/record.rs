// src/extractors/record.rs
use chrono::NaiveDate;

/// Fertilizer products, in the column order used by the bulletins.
pub const PRODUCTS: [&str; 7] = [
    "Urea_Prilled",
    "Urea_Granular",
    "Ammosul",
    "Complete",
    "Ammophos",
    "MOP",
    "DAP",
];

pub const REGIONAL_SUMMARY: &str = "Regional Summary";
pub const REGIONAL_AVERAGE: &str = "Regional Average";
pub const UNKNOWN_REGION: &str = "Unknown";

/// One price per entry of [`PRODUCTS`].
pub type Prices = [Option<f64>; 7];

/// A single normalized row of a fertilizer bulletin.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord {
    pub date: NaiveDate,           // Always the first of the month
    pub region: String,
    pub province: String,          // Province, or one of the sentinel labels
    pub prices: Prices,
    pub source_document: String,   // File name of the bulletin
}

impl ExtractedRecord {
    /// True for "Regional Summary" / "Regional Average" rows.
    pub fn is_sentinel(&self) -> bool {
        is_sentinel_province(&self.province)
    }
}

pub fn is_sentinel_province(province: &str) -> bool {
    province == REGIONAL_SUMMARY || province == REGIONAL_AVERAGE
}

pub fn has_any_price(prices: &Prices) -> bool {
    prices.iter().any(Option::is_some)
}
