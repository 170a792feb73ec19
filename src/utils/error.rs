// src/utils/error.rs
use thiserror::Error;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error {0} for {1}")]
    Http(reqwest::StatusCode, String), // e.g., 404 Not Found, 403 Forbidden

    #[error("Invalid URL '{0}': {1}")]
    Url(String, String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse source response: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Source interaction failed: {0}")]
    Source(#[from] SourceError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
