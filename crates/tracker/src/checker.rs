//! Single-page price checks.

use crate::error::CheckError;
use compact_str::CompactString;
use pricewatch_core::{ExtractionResult, FixedPoint};
use pricewatch_scraper::{DocumentFetcher, ScrapeResult, SelectorEngine};
use std::sync::Arc;
use tracing::debug;

/// Outcome of a one-shot check against a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceCheck {
    pub current_price: FixedPoint,
    pub target_price: FixedPoint,
    pub is_below_target: bool,
    pub price_string: String,
    pub strategy_id: CompactString,
}

/// Fetches a page and runs the selector engine over it.
#[derive(Clone)]
pub struct PriceChecker {
    fetcher: Arc<dyn DocumentFetcher>,
    engine: Arc<SelectorEngine>,
}

impl PriceChecker {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, engine: Arc<SelectorEngine>) -> Self {
        Self { fetcher, engine }
    }

    /// Fetch `url` once and locate its price, trying `cached_strategy` first.
    pub async fn check(
        &self,
        url: &str,
        cached_strategy: Option<&str>,
    ) -> ScrapeResult<ExtractionResult> {
        let html = self.fetcher.fetch(url).await?;
        debug!(url = url, bytes = html.len(), "Fetched page");
        self.engine.locate(&html, cached_strategy)
    }

    /// Check a page once without tracking it.
    pub async fn check_once(
        &self,
        url: &str,
        target_price: FixedPoint,
    ) -> Result<PriceCheck, CheckError> {
        if url.trim().is_empty() {
            return Err(CheckError::InvalidInput("url must not be empty".to_string()));
        }
        if target_price.is_zero() {
            return Err(CheckError::InvalidInput(
                "target price must be positive".to_string(),
            ));
        }

        let result = self.check(url, None).await?;
        Ok(PriceCheck {
            current_price: result.price,
            target_price,
            is_below_target: result.price <= target_price,
            price_string: result.display_text,
            strategy_id: result.strategy_id,
        })
    }
}
