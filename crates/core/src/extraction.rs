//! Result of locating a price in a page.

use crate::FixedPoint;
use compact_str::CompactString;

/// A price found on a page, plus the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub price: FixedPoint,
    /// Matched text before cleaning.
    pub display_text: String,
    /// Identifier of the winning strategy; pass it back to re-run only that strategy.
    pub strategy_id: CompactString,
}
