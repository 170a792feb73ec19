// src/extractors/classify.rs

// --- Imports ---
use crate::extractors::number::parse_price;
use crate::extractors::record::{has_any_price, Prices, REGIONAL_AVERAGE, REGIONAL_SUMMARY, UNKNOWN_REGION};

// --- Table Primitives ---
/// A cell as produced by the table backend; merged or empty cells are `None`.
pub type Cell = Option<String>;
pub type Row = Vec<Cell>;
pub type Table = Vec<Row>;

// Regions whose labels in the bulletins carry no "REGION" prefix.
const UNPREFIXED_REGIONS: [&str; 3] = ["CAR", "CARAGA", "BARMM"];

// --- Data Structures ---
/// The region a bulletin is currently listing provinces for.
/// Lives for one document and is replaced on every region-marker row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionContext {
    pub current_region: String,
}

impl Default for RegionContext {
    fn default() -> Self {
        Self { current_region: UNKNOWN_REGION.to_string() }
    }
}

impl RegionContext {
    pub fn new(region: impl Into<String>) -> Self {
        Self { current_region: region.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BlankLabel,
    ColumnHeader,  // "REGION/PROVINCE"
    ProductHeader, // "FERTILIZER", "UREA ..."
    PriceLabel,    // "46-0-0 ...", "PRICE"
    NoPrices,
}

/// A data row, not yet stamped with its document period.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRow {
    pub region: String,
    pub province: String,
    pub prices: Prices,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Skip(SkipReason),
    Record(ClassifiedRow),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Skip(SkipReason),
    RegionMarker,
    RegionalAverage,
    Province,
}

// --- Rule Table ---
struct Rule {
    kind: RowKind,
    matches: fn(&str) -> bool,
}

fn is_column_header(label: &str) -> bool {
    label.contains("REGION") && label.contains("PROVINCE")
}

fn is_product_header(label: &str) -> bool {
    label.contains("FERTILIZER") || label.contains("UREA")
}

fn is_price_label(label: &str) -> bool {
    label.starts_with("46-0-0") || label == "PRICE"
}

fn is_region_marker(label: &str) -> bool {
    label.contains("REGION") || UNPREFIXED_REGIONS.contains(&label)
}

fn is_regional_average(label: &str) -> bool {
    label == "AVE" || label == "AVERAGE PRICE"
}

/// Evaluated in order against the upper-cased first cell; the first match wins.
/// A label matching none of them is a province row.
static RULES: [Rule; 5] = [
    Rule { kind: RowKind::Skip(SkipReason::ColumnHeader), matches: is_column_header },
    Rule { kind: RowKind::Skip(SkipReason::ProductHeader), matches: is_product_header },
    Rule { kind: RowKind::Skip(SkipReason::PriceLabel), matches: is_price_label },
    Rule { kind: RowKind::RegionMarker, matches: is_region_marker },
    Rule { kind: RowKind::RegionalAverage, matches: is_regional_average },
];

fn row_kind(label: &str) -> RowKind {
    RULES
        .iter()
        .find(|rule| (rule.matches)(label))
        .map(|rule| rule.kind)
        .unwrap_or(RowKind::Province)
}

// --- Classification ---
/// Classifies one table row under the given region context.
///
/// Returns the outcome together with the context that applies to the next row.
/// Region-marker rows replace the context even when they carry no prices.
pub fn classify_row(row: &[Cell], context: &RegionContext) -> (RowOutcome, RegionContext) {
    let raw = match row.first().and_then(|cell| cell.as_deref()).map(str::trim) {
        Some(label) if !label.is_empty() => label,
        _ => return (RowOutcome::Skip(SkipReason::BlankLabel), context.clone()),
    };

    let (next_context, province) = match row_kind(&raw.to_uppercase()) {
        RowKind::Skip(reason) => return (RowOutcome::Skip(reason), context.clone()),
        RowKind::RegionMarker => {
            let mut lines = raw.split('\n').map(str::trim);
            let region = lines.next().unwrap_or_default();
            let rest: Vec<&str> = lines.collect();
            // A multi-line marker also names the province whose prices follow.
            let province = if rest.is_empty() {
                REGIONAL_SUMMARY.to_string()
            } else {
                rest.join(" ").trim().to_string()
            };
            (RegionContext::new(region), province)
        }
        RowKind::RegionalAverage => (context.clone(), REGIONAL_AVERAGE.to_string()),
        RowKind::Province => (context.clone(), raw.replace('\n', " ").trim().to_string()),
    };

    let prices: Prices = std::array::from_fn(|i| parse_price(row.get(i + 1).and_then(|cell| cell.as_deref())));
    if !has_any_price(&prices) {
        return (RowOutcome::Skip(SkipReason::NoPrices), next_context);
    }

    let record = ClassifiedRow {
        region: next_context.current_region.clone(),
        province,
        prices,
    };
    (RowOutcome::Record(record), next_context)
}
