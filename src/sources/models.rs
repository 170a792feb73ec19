// src/sources/models.rs
use serde::{Deserialize, Serialize};

/// Harvested rice area of the target region for one cropping semester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiceAreaRecord {
    pub date: String, // e.g. "2024-S1"
    pub year: i32,
    pub semester: u8,
    pub region: String,
    pub rice_area_ha: f64,
}

/// Mean yield across the target region's provinces for one cropping semester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldRecord {
    pub date: String,
    pub year: i32,
    pub semester: u8,
    pub region: String,
    pub avg_yield_ton_per_ha: f64,
}

/// Label PRISM data is reported under, e.g. "2024-S1".
pub fn semester_label(year: i32, semester: u8) -> String {
    format!("{}-S{}", year, semester)
}
