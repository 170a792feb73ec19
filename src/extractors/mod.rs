// src/extractors/mod.rs
pub mod classify;
pub mod document;
pub mod number;
pub mod pdf;
pub mod period;
pub mod record;
