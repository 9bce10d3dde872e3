//! Error handling module for the image replicator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplicatorError {
    /// Invalid or incomplete configuration; aborts the run before any image is processed
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Missing, empty or malformed image list
    #[error("Input error: {0}")]
    Input(String),
    /// Destination lookup failed (distinct from "not found")
    #[error("Lookup error: {0}")]
    Lookup(String),
    #[error("Copy error: {0}")]
    Copy(String),
    #[error("Report error: {0}")]
    Report(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl ReplicatorError {
    /// Whether this error must abort the whole run rather than a single image
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReplicatorError::Configuration(_) | ReplicatorError::Input(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReplicatorError>;
