// src/sources/mod.rs
pub mod client;
pub mod models;
pub mod prism;

pub use client::SourceClient;
