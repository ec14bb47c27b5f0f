//! Price scraping from product pages.
//!
//! ## Architecture
//!
//! - `parser` - Price text to [`pricewatch_core::FixedPoint`], locale aware
//! - `selector` - Ordered extraction strategies over a parsed HTML document
//! - `fetch` - Page download behind the [`DocumentFetcher`] trait

pub mod error;
pub mod fetch;
pub mod parser;
pub mod selector;

pub use error::*;
pub use fetch::*;
pub use parser::*;
pub use selector::*;
