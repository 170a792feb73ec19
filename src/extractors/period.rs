// src/extractors/period.rs
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\s_.\-]+").expect("Failed to compile SEPARATOR_RE")
});

static YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"20\d{2}").expect("Failed to compile YEAR_RE")
});

// Month names and abbreviations. The alternation is built longest-first so that
// "september" is preferred over "sept" and "sep" at the same position.
static MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    let mut names: Vec<&str> = MONTHS.iter().map(|(name, _)| *name).collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    Regex::new(&format!("({})", names.join("|"))).expect("Failed to compile MONTH_RE")
});

const MONTHS: &[(&str, u32)] = &[
    ("january", 1), ("february", 2), ("march", 3), ("april", 4),
    ("may", 5), ("june", 6), ("july", 7), ("august", 8),
    ("september", 9), ("october", 10), ("november", 11), ("december", 12),
    ("jan", 1), ("feb", 2), ("mar", 3), ("apr", 4),
    ("jun", 6), ("jul", 7), ("aug", 8), ("sep", 9), ("sept", 9),
    ("oct", 10), ("nov", 11), ("dec", 12),
];

/// Infers the reporting period of a bulletin from its file name.
///
/// Returns the first day of the month, or `None` when either the year or the
/// month cannot be found. Callers skip documents without a period.
pub fn infer_period(file_name: &str) -> Option<NaiveDate> {
    let normalized = SEPARATOR_RE
        .replace_all(&file_name.to_lowercase(), "-")
        .into_owned();

    let year = YEAR_RE.find(&normalized)?.as_str().parse::<i32>().ok()?;

    let token = MONTH_RE.find(&normalized)?.as_str();
    let token = if token == "sept" { "sep" } else { token };
    let month = MONTHS
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, month)| *month)?;

    let period = NaiveDate::from_ymd_opt(year, month, 1);
    if period.is_none() {
        tracing::debug!("Could not build a date from '{}' {} in {}", token, year, file_name);
    }
    period
}
