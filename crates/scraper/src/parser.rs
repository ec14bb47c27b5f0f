//! Price text parsing.
//!
//! Turns strings such as `"₹60,100"`, `"1.234,56 €"` or `"$29.99"` into a
//! [`FixedPoint`]. Separator handling follows a small set of locale rules:
//!
//! - more than one `.` together with a `,` is European grouping (`1.234.567,89`)
//! - more than one `.` without a `,` is grouping of a whole number (`1.234.567`)
//! - a single `.` followed later by a `,` is also European (`1.234,56`)
//! - a lone `,` exactly three characters from the end is a decimal comma (`1,23`)
//! - any other `,` is a grouping separator and is dropped (`60,100`)

use pricewatch_core::{FixedPoint, FixedPointError};
use thiserror::Error;

/// Currency glyphs removed before parsing.
const CURRENCY_GLYPHS: &[char] = &['$', '€', '£', '₹', '¥', '₩', '₽', '₺', '₫', '₱', '₦', '¢'];

/// Text that could not be read as a price.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse '{raw}' (cleaned: '{cleaned}'): {kind}")]
pub struct ParseError {
    pub raw: String,
    pub cleaned: String,
    pub kind: FixedPointError,
}

/// Parse displayed price text into a non-negative fixed-point value.
pub fn parse_price(raw: &str) -> Result<FixedPoint, ParseError> {
    let cleaned = normalize_separators(&strip_decorations(raw));

    cleaned.parse::<FixedPoint>().map_err(|kind| ParseError {
        raw: raw.to_string(),
        cleaned,
        kind,
    })
}

/// Drop currency glyphs and every kind of whitespace, including non-breaking spaces.
fn strip_decorations(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_GLYPHS.contains(c))
        .collect()
}

/// Rewrite grouping/decimal separators so only a single `.` decimal point remains.
fn normalize_separators(s: &str) -> String {
    let dots = s.matches('.').count();
    let last_comma = s.rfind(',');
    let last_dot = s.rfind('.');

    match (last_comma, last_dot) {
        (Some(_), Some(_)) if dots > 1 => european(s),
        (Some(comma), Some(dot)) if comma > dot => european(s),
        (None, Some(_)) if dots > 1 => s.replace('.', ""),
        (Some(comma), None) if comma + 3 == s.len() => s.replace(',', "."),
        _ => s.replace(',', ""),
    }
}

fn european(s: &str) -> String {
    s.replace('.', "").replace(',', ".")
}
