//! Price location inside arbitrary product pages.
//!
//! Strategies are tried in priority order and the first one whose text the
//! parser accepts wins. The winning strategy id is returned so the next poll
//! can re-run only that strategy before falling back to the full list.

use crate::error::{ScrapeError, ScrapeResult};
use crate::parser::parse_price;
use compact_str::CompactString;
use pricewatch_core::ExtractionResult;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Strategy id of the split whole/fraction price.
pub const SPLIT_PRICE_ID: &str = ".a-price-whole (composite)";

const WHOLE_SELECTOR: &str = ".a-price-whole";
const FRACTION_SELECTOR: &str = ".a-price-fraction";
const SYMBOL_SELECTOR: &str = ".a-price-symbol";

/// Generic candidates, most specific first.
pub const DEFAULT_CANDIDATES: &[&str] = &[
    ".a-price.a-text-price .a-offscreen",
    ".a-price-whole",
    ".a-offscreen",
    "[itemprop='price']",
    ".price",
    ".product-price",
    ".current-price",
    "#priceblock_ourprice",
    "#priceblock_dealprice",
    ".priceInfo .price .value",
];

fn compile(selector: &str) -> ScrapeResult<Selector> {
    Selector::parse(selector).map_err(|e| ScrapeError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{:?}", e),
    })
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// One way of finding price text in a document.
#[derive(Debug, Clone)]
pub enum ExtractionStrategy {
    /// Whole and fractional digits rendered in sibling elements.
    SplitPrice {
        whole: Selector,
        fraction: Selector,
        symbol: Selector,
    },
    /// First element matching a CSS selector, by text or `content` attribute.
    Css {
        text: CompactString,
        selector: Selector,
    },
}

impl ExtractionStrategy {
    /// Split whole/fraction strategy.
    pub fn split_price() -> ScrapeResult<Self> {
        Ok(ExtractionStrategy::SplitPrice {
            whole: compile(WHOLE_SELECTOR)?,
            fraction: compile(FRACTION_SELECTOR)?,
            symbol: compile(SYMBOL_SELECTOR)?,
        })
    }

    /// Single CSS selector strategy.
    pub fn css(text: &str) -> ScrapeResult<Self> {
        Ok(ExtractionStrategy::Css {
            text: CompactString::new(text),
            selector: compile(text)?,
        })
    }

    /// Identifier reported in [`ExtractionResult::strategy_id`].
    pub fn id(&self) -> &str {
        match self {
            ExtractionStrategy::SplitPrice { .. } => SPLIT_PRICE_ID,
            ExtractionStrategy::Css { text, .. } => text.as_str(),
        }
    }

    /// Returns (text to parse, text as displayed).
    fn find_text(&self, document: &Html) -> Option<(String, String)> {
        match self {
            ExtractionStrategy::SplitPrice {
                whole,
                fraction,
                symbol,
            } => {
                let whole_el = document.select(whole).next()?;
                let raw_whole = element_text(&whole_el);
                let raw_whole = raw_whole.trim_end_matches('.');
                let digits = raw_whole.replace(',', "");
                if digits.is_empty() {
                    return None;
                }

                let sibling = |sel: &Selector| {
                    whole_el
                        .prev_siblings()
                        .chain(whole_el.next_siblings())
                        .filter_map(ElementRef::wrap)
                        .find(|el| sel.matches(el))
                        .map(|el| element_text(&el))
                };
                let fraction_text = sibling(fraction)
                    .filter(|f| !f.is_empty())
                    .unwrap_or_else(|| "00".to_string());
                let symbol_text = sibling(symbol).unwrap_or_default();

                Some((
                    format!("{}.{}", digits, fraction_text),
                    format!("{}{}.{}", symbol_text, raw_whole, fraction_text),
                ))
            }
            ExtractionStrategy::Css { selector, .. } => {
                document.select(selector).find_map(|el| {
                    let text = element_text(&el);
                    if !text.is_empty() {
                        return Some((text.clone(), text));
                    }
                    el.value()
                        .attr("content")
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(|c| (c.to_string(), c.to_string()))
                })
            }
        }
    }

    /// Run this strategy alone.
    pub fn apply(&self, document: &Html) -> ScrapeResult<ExtractionResult> {
        let (candidate, display_text) = self
            .find_text(document)
            .ok_or_else(|| ScrapeError::NotFound(format!("no match for '{}'", self.id())))?;

        let price = parse_price(&candidate)?;
        // A zero is a placeholder, not an observed price.
        if price.is_zero() {
            return Err(ScrapeError::NotFound(format!(
                "zero placeholder for '{}'",
                self.id()
            )));
        }
        Ok(ExtractionResult {
            price,
            display_text,
            strategy_id: CompactString::new(self.id()),
        })
    }
}

/// Ordered list of extraction strategies.
#[derive(Debug, Clone)]
pub struct SelectorEngine {
    strategies: Vec<ExtractionStrategy>,
}

impl SelectorEngine {
    /// Create an engine from an explicit strategy list.
    pub fn new(strategies: Vec<ExtractionStrategy>) -> Self {
        Self { strategies }
    }

    /// Split-price strategy followed by the given CSS candidates, in order.
    pub fn from_selectors<S: AsRef<str>>(candidates: &[S]) -> ScrapeResult<Self> {
        let mut strategies = Vec::with_capacity(candidates.len() + 1);
        strategies.push(ExtractionStrategy::split_price()?);
        for candidate in candidates {
            strategies.push(ExtractionStrategy::css(candidate.as_ref())?);
        }
        Ok(Self { strategies })
    }

    /// Strategies in priority order.
    pub fn strategies(&self) -> &[ExtractionStrategy] {
        &self.strategies
    }

    /// Try every strategy; the first parser-accepted match wins.
    pub fn extract(&self, document: &Html) -> ScrapeResult<ExtractionResult> {
        for strategy in &self.strategies {
            match strategy.apply(document) {
                Ok(result) => {
                    debug!(
                        strategy = strategy.id(),
                        price = %result.price,
                        "Found price"
                    );
                    return Ok(result);
                }
                Err(ScrapeError::Parse(e)) => {
                    debug!(strategy = strategy.id(), error = %e, "Candidate text rejected");
                }
                Err(_) => {}
            }
        }

        Err(ScrapeError::NotFound(
            "could not find or parse price on page with known selectors".to_string(),
        ))
    }

    /// Re-apply a single strategy by id. Unknown ids are treated as CSS selectors.
    pub fn extract_with_strategy(
        &self,
        document: &Html,
        strategy_id: &str,
    ) -> ScrapeResult<ExtractionResult> {
        match self.strategies.iter().find(|s| s.id() == strategy_id) {
            Some(strategy) => strategy.apply(document),
            None => ExtractionStrategy::css(strategy_id)?.apply(document),
        }
    }

    /// Parse `html` and locate its price, trying `cached` first.
    ///
    /// Kept synchronous: the parsed DOM is not `Send` and must not live across
    /// an await point.
    pub fn locate(&self, html: &str, cached: Option<&str>) -> ScrapeResult<ExtractionResult> {
        let document = Html::parse_document(html);

        if let Some(strategy_id) = cached {
            match self.extract_with_strategy(&document, strategy_id) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    debug!(
                        strategy = strategy_id,
                        error = %e,
                        "Cached strategy failed, trying full list"
                    );
                }
            }
        }

        self.extract(&document)
    }
}

impl Default for SelectorEngine {
    fn default() -> Self {
        let strategies = std::iter::once(ExtractionStrategy::split_price())
            .chain(DEFAULT_CANDIDATES.iter().map(|s| ExtractionStrategy::css(s)))
            .filter_map(|strategy| {
                strategy
                    .map_err(|e| warn!(error = %e, "Skipping built-in strategy"))
                    .ok()
            })
            .collect();

        Self { strategies }
    }
}
