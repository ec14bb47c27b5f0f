//! Error types for tracking operations.

use pricewatch_scraper::ScrapeError;
use thiserror::Error;

/// Errors returned by the tracking registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Item '{0}' is already being tracked")]
    Duplicate(String),

    #[error("Invalid tracking request: {0}")]
    InvalidInput(String),
}

/// Errors returned by one-shot price checks.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Invalid check request: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),
}
