// src/pipeline/mod.rs
pub mod aggregate;
pub mod fertilizer;
pub mod rice;
pub mod yields;
