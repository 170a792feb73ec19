// src/storage/rows.rs
#![allow(non_snake_case)]
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::extractors::record::ExtractedRecord;
use crate::pipeline::aggregate::MonthlyAggregate;

/// Column layout of a per-document cache file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecordRow {
    pub Date: NaiveDate,
    pub Month: String,
    pub Year: i32,
    pub Region: String,
    pub Province: String,
    pub Urea_Prilled: Option<f64>,
    pub Urea_Granular: Option<f64>,
    pub Ammosul: Option<f64>,
    pub Complete: Option<f64>,
    pub Ammophos: Option<f64>,
    pub MOP: Option<f64>,
    pub DAP: Option<f64>,
    pub Source_File: String,
}

/// Column layout of the monthly aggregate file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub Date: NaiveDate,
    pub Year: i32,
    pub Month: String,
    pub Region: String,
    pub Province: String,
    pub Urea_Prilled: Option<f64>,
    pub Urea_Granular: Option<f64>,
    pub Ammosul: Option<f64>,
    pub Complete: Option<f64>,
    pub Ammophos: Option<f64>,
    pub MOP: Option<f64>,
    pub DAP: Option<f64>,
}

fn month_name(date: NaiveDate) -> String {
    date.format("%B").to_string()
}

impl From<&ExtractedRecord> for CachedRecordRow {
    fn from(r: &ExtractedRecord) -> Self {
        let [urea_prilled, urea_granular, ammosul, complete, ammophos, mop, dap] = r.prices;
        Self {
            Date: r.date,
            Month: month_name(r.date),
            Year: r.date.year(),
            Region: r.region.clone(),
            Province: r.province.clone(),
            Urea_Prilled: urea_prilled,
            Urea_Granular: urea_granular,
            Ammosul: ammosul,
            Complete: complete,
            Ammophos: ammophos,
            MOP: mop,
            DAP: dap,
            Source_File: r.source_document.clone(),
        }
    }
}

impl From<CachedRecordRow> for ExtractedRecord {
    fn from(row: CachedRecordRow) -> Self {
        Self {
            // Month and Year are derived columns; Date is authoritative.
            date: row.Date.with_day(1).unwrap_or(row.Date),
            region: row.Region,
            province: row.Province,
            prices: [
                row.Urea_Prilled,
                row.Urea_Granular,
                row.Ammosul,
                row.Complete,
                row.Ammophos,
                row.MOP,
                row.DAP,
            ],
            source_document: row.Source_File,
        }
    }
}

impl From<&MonthlyAggregate> for AggregateRow {
    fn from(m: &MonthlyAggregate) -> Self {
        let [urea_prilled, urea_granular, ammosul, complete, ammophos, mop, dap] = m.prices;
        Self {
            Date: m.date,
            Year: m.date.year(),
            Month: month_name(m.date),
            Region: m.region.clone(),
            Province: m.province.clone(),
            Urea_Prilled: urea_prilled,
            Urea_Granular: urea_granular,
            Ammosul: ammosul,
            Complete: complete,
            Ammophos: ammophos,
            MOP: mop,
            DAP: dap,
        }
    }
}
