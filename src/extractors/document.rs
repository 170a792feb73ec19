// src/extractors/document.rs
use crate::extractors::classify::{classify_row, RegionContext, RowOutcome, Table};
use crate::extractors::period::infer_period;
use crate::extractors::record::ExtractedRecord;
use crate::utils::error::ExtractError;

/// Anything that can hand out the tables of a bulletin, page by page.
pub trait TableSource {
    /// File name of the document; also the source of its reporting period.
    fn document_id(&self) -> &str;

    /// Tables of each page, in reading order.
    fn pages(&self) -> Result<Vec<Vec<Table>>, ExtractError>;
}

/// Extracts all fertilizer price records from one bulletin.
///
/// Documents whose period cannot be inferred from the file name yield no
/// records and are never opened. The region context carries over between
/// tables and pages of the same document.
pub fn parse_document<S: TableSource + ?Sized>(source: &S) -> Result<Vec<ExtractedRecord>, ExtractError> {
    let document_id = source.document_id();
    let Some(period) = infer_period(document_id) else {
        tracing::warn!("Skipping {}: no month/year in file name", document_id);
        return Ok(Vec::new());
    };

    let mut context = RegionContext::default();
    let mut records = Vec::new();

    for (page_index, tables) in source.pages()?.iter().enumerate() {
        tracing::trace!("{}: page {} has {} table(s)", document_id, page_index + 1, tables.len());
        for row in tables.iter().flatten() {
            let (outcome, next) = classify_row(row, &context);
            context = next;
            if let RowOutcome::Record(row) = outcome {
                records.push(ExtractedRecord {
                    date: period,
                    region: row.region,
                    province: row.province,
                    prices: row.prices,
                    source_document: document_id.to_string(),
                });
            }
        }
    }

    tracing::debug!("Parsed {} record(s) from {} ({})", records.len(), document_id, period.format("%Y-%m"));
    Ok(records)
}

/// Tables held in memory, for documents whose layout is already known.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocument {
    pub id: String,
    pub pages: Vec<Vec<Table>>,
}

#[cfg(test)]
impl InMemoryDocument {
    pub fn new(id: impl Into<String>, pages: Vec<Vec<Table>>) -> Self {
        Self { id: id.into(), pages }
    }
}

#[cfg(test)]
impl TableSource for InMemoryDocument {
    fn document_id(&self) -> &str {
        &self.id
    }

    fn pages(&self) -> Result<Vec<Vec<Table>>, ExtractError> {
        Ok(self.pages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::classify::Row;
    use chrono::NaiveDate;
    use std::cell::Cell as Counter;

    fn row(cells: &[&str]) -> Row {
        cells
            .iter()
            .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
            .collect()
    }

    struct CountingSource {
        id: String,
        opened: Counter<u32>,
    }

    impl TableSource for CountingSource {
        fn document_id(&self) -> &str {
            &self.id
        }

        fn pages(&self) -> Result<Vec<Vec<Table>>, ExtractError> {
            self.opened.set(self.opened.get() + 1);
            Ok(vec![vec![vec![row(&["Cebu", "100"])]]])
        }
    }

    #[test]
    fn test_undetermined_period_is_not_opened() {
        let source = CountingSource { id: "report_2023.pdf".to_string(), opened: Counter::new(0) };
        let records = parse_document(&source).expect("parse should not fail");
        assert!(records.is_empty());
        assert_eq!(source.opened.get(), 0);
    }

    #[test]
    fn test_records_are_stamped_and_context_spans_tables_and_pages() {
        let doc = InMemoryDocument::new(
            "WFP_Weekly_Prices_March_2024.pdf",
            vec![
                vec![
                    vec![
                        row(&["REGION/PROVINCE", "46-0-0", "46-0-0", "21-0-0", "14-14-14", "16-20-0", "0-0-60", "18-46-0"]),
                        row(&["REGION VI", "1,500"]),
                        row(&["Iloilo", "1,510", "1,520"]),
                    ],
                    vec![
                        row(&["REGION VII\nCebu", "1,600", "1,650"]),
                    ],
                ],
                vec![
                    vec![
                        row(&["Bohol", "1,580"]),
                        row(&["AVE", "1,590"]),
                    ],
                ],
            ],
        );

        let records = parse_document(&doc).expect("parse should not fail");
        let summary: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.region.as_str(), r.province.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("REGION VI", "Regional Summary"),
                ("REGION VI", "Iloilo"),
                ("REGION VII", "Cebu"),
                ("REGION VII", "Bohol"),
                ("REGION VII", "Regional Average"),
            ]
        );

        let march = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(records.iter().all(|r| r.date == march));
        assert!(records.iter().all(|r| r.source_document == "WFP_Weekly_Prices_March_2024.pdf"));
    }

    #[test]
    fn test_rows_before_any_region_use_unknown() {
        let doc = InMemoryDocument::new("fertilizer-jan-2022.pdf", vec![vec![vec![row(&["Cebu", "1,000"])]]]);
        let records = parse_document(&doc).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].region, "Unknown");
    }

    #[test]
    fn test_context_does_not_leak_between_documents() {
        let first = InMemoryDocument::new("wfp-jan-2022.pdf", vec![vec![vec![row(&["REGION VII", "1"])]]]);
        let second = InMemoryDocument::new("wfp-feb-2022.pdf", vec![vec![vec![row(&["Cebu", "2"])]]]);
        parse_document(&first).unwrap();
        let records = parse_document(&second).unwrap();
        assert_eq!(records[0].region, "Unknown");
    }
}
