//! Error types for scraping operations.

use thiserror::Error;

use crate::parser::ParseError;

/// Errors that can occur while fetching a page or locating its price.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Price not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Bad status: {0}")]
    Status(u16),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
}

impl From<url::ParseError> for ScrapeError {
    fn from(err: url::ParseError) -> Self {
        ScrapeError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            ScrapeError::Status(status.as_u16())
        } else {
            ScrapeError::Network(err.to_string())
        }
    }
}

impl ScrapeError {
    /// Returns true if this error is transient and likely to succeed on the next poll.
    pub fn is_transient(&self) -> bool {
        match self {
            ScrapeError::Network(_) | ScrapeError::Timeout(_) => true,
            ScrapeError::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Result type for scrape operations.
pub type ScrapeResult<T> = Result<T, ScrapeError>;
