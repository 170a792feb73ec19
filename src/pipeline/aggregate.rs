// src/pipeline/aggregate.rs
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::extractors::document::{parse_document, TableSource};
use crate::extractors::record::{ExtractedRecord, Prices};
use crate::storage::cache::RecordCache;

/// Mean fertilizer prices of one province for one month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAggregate {
    pub date: NaiveDate,
    pub region: String,
    pub province: String,
    pub prices: Prices,
}

/// Result of aggregating a corpus. Everything but `Aggregated` is an
/// empty-result condition: reported, never written.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    NoRecords,
    NoRegionalRows,
    NoProvinceRows,
    Aggregated(Vec<MonthlyAggregate>),
}

/// How each document of a corpus was handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub cached: usize,
    pub parsed: usize,
    pub empty: usize,
    pub failed: usize,
    pub records: usize,
}

/// Keeps records whose region label contains `marker`, ignoring case.
pub fn filter_region(records: Vec<ExtractedRecord>, marker: &str) -> Vec<ExtractedRecord> {
    let marker = marker.to_uppercase();
    records
        .into_iter()
        .filter(|r| r.region.to_uppercase().contains(&marker))
        .collect()
}

#[derive(Default)]
struct Accumulator {
    sums: [f64; 7],
    counts: [u32; 7],
}

/// Averages province rows per (year, month, region, province).
/// Sentinel rows are dropped first; a price with no values stays empty.
/// Output is ordered by (date, province).
pub fn monthly_means(records: &[ExtractedRecord]) -> Vec<MonthlyAggregate> {
    let mut groups: BTreeMap<(i32, u32, &str, &str), Accumulator> = BTreeMap::new();

    for record in records.iter().filter(|r| !r.is_sentinel()) {
        let key = (record.date.year(), record.date.month(), record.region.as_str(), record.province.as_str());
        let acc = groups.entry(key).or_default();
        for (i, price) in record.prices.iter().enumerate() {
            if let Some(value) = price {
                acc.sums[i] += value;
                acc.counts[i] += 1;
            }
        }
    }

    let mut aggregates: Vec<MonthlyAggregate> = groups
        .into_iter()
        .filter_map(|((year, month, region, province), acc)| {
            let date = NaiveDate::from_ymd_opt(year, month, 1)?;
            let prices: Prices = std::array::from_fn(|i| {
                (acc.counts[i] > 0).then(|| acc.sums[i] / f64::from(acc.counts[i]))
            });
            Some(MonthlyAggregate {
                date,
                region: region.to_string(),
                province: province.to_string(),
                prices,
            })
        })
        .collect();

    aggregates.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.province.cmp(&b.province)));
    aggregates
}

/// Turns a set of bulletins into the monthly regional summary, reusing cached
/// extractions where they exist.
pub struct CorpusAggregator<C: RecordCache> {
    cache: C,
    target_region: String,
}

impl<C: RecordCache> CorpusAggregator<C> {
    pub fn new(cache: C, target_region: impl Into<String>) -> Self {
        Self { cache, target_region: target_region.into() }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Records of one document: from the cache when present, otherwise parsed
    /// and, when non-empty, stored for the next run.
    fn document_records<S: TableSource>(&mut self, document: &S, stats: &mut CorpusStats) -> Option<Vec<ExtractedRecord>> {
        let id = document.document_id();

        match self.cache.load(id) {
            Ok(Some(records)) => {
                tracing::debug!("Loaded {} cached record(s) for {}", records.len(), id);
                stats.cached += 1;
                return Some(records);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring unreadable cache for {}: {}", id, e),
        }

        let records = match parse_document(document) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Failed to extract {}: {}", id, e);
                stats.failed += 1;
                return None;
            }
        };

        if records.is_empty() {
            stats.empty += 1;
            return None;
        }

        stats.parsed += 1;
        if let Err(e) = self.cache.store(id, &records) {
            tracing::warn!("Could not cache records for {}: {}", id, e);
        }
        Some(records)
    }

    /// Concatenates the records of all documents, in document order.
    /// A document that fails is logged and left out.
    pub fn collect<S: TableSource>(&mut self, documents: &[S]) -> (Vec<ExtractedRecord>, CorpusStats) {
        let mut stats = CorpusStats::default();
        let mut corpus = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            tracing::info!("Parsing {}/{}: {}", index + 1, documents.len(), document.document_id());
            if let Some(records) = self.document_records(document, &mut stats) {
                corpus.extend(records);
            }
        }

        stats.records = corpus.len();
        (corpus, stats)
    }

    /// Filters a corpus to the target region and averages it by month.
    pub fn aggregate(&self, corpus: Vec<ExtractedRecord>) -> AggregateOutcome {
        if corpus.is_empty() {
            return AggregateOutcome::NoRecords;
        }

        let regional = filter_region(corpus, &self.target_region);
        if regional.is_empty() {
            return AggregateOutcome::NoRegionalRows;
        }
        tracing::info!("{} record(s) for {}", regional.len(), self.target_region);

        let monthly = monthly_means(&regional);
        if monthly.is_empty() {
            return AggregateOutcome::NoProvinceRows;
        }
        AggregateOutcome::Aggregated(monthly)
    }

    pub fn run<S: TableSource>(&mut self, documents: &[S]) -> (AggregateOutcome, CorpusStats) {
        let (corpus, stats) = self.collect(documents);
        tracing::info!(
            "Corpus: {} record(s); {} parsed, {} cached, {} without records, {} failed",
            stats.records, stats.parsed, stats.cached, stats.empty, stats.failed
        );
        (self.aggregate(corpus), stats)
    }
}
