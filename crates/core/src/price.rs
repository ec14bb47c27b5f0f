//! Fixed-point price representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when reading a decimal string into a [`FixedPoint`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixedPointError {
    #[error("empty decimal string")]
    Empty,

    #[error("negative values are not allowed")]
    Negative,

    #[error("not a decimal number")]
    Invalid,

    #[error("value out of range")]
    Overflow,
}

/// Non-negative fixed-point number with 8 decimal places.
/// Used for precise price representation without floating-point errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FixedPoint(pub u64);

impl FixedPoint {
    /// Number of decimal places (8 for price precision)
    pub const DECIMALS: u32 = 8;
    /// Scale factor: 10^8 (fits comfortably in u64 for most prices)
    pub const SCALE: u64 = 100_000_000;
    /// Zero, also used as "no price observed yet".
    pub const ZERO: FixedPoint = FixedPoint(0);

    /// Create from f64 (for testing/convenience, not recommended for production)
    pub fn from_f64(value: f64) -> Self {
        Self((value * Self::SCALE as f64).round() as u64)
    }

    /// Convert to f64 (for display/serialization)
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl FromStr for FixedPoint {
    type Err = FixedPointError;

    /// Exact decimal parse. Digits past the 8th fractional place are truncated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(FixedPointError::Empty);
        }
        if let Some(rest) = s.strip_prefix('-') {
            return match rest.parse::<FixedPoint>() {
                Ok(_) => Err(FixedPointError::Negative),
                Err(_) => Err(FixedPointError::Invalid),
            };
        }

        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(FixedPointError::Invalid);
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(FixedPointError::Invalid);
        }

        // An all-digit string only fails to parse when it overflows.
        let whole: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| FixedPointError::Overflow)?
        };

        let mut frac = 0u64;
        let mut digits = 0u32;
        for b in frac_part.bytes().take(Self::DECIMALS as usize) {
            frac = frac * 10 + u64::from(b - b'0');
            digits += 1;
        }
        frac *= 10u64.pow(Self::DECIMALS - digits);

        whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac))
            .map(FixedPoint)
            .ok_or(FixedPointError::Overflow)
    }
}

impl fmt::Display for FixedPoint {
    /// Renders with at least two decimals: `60100.00`, `1234.99`, `0.125`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        let frac = format!("{:08}", self.0 % Self::SCALE);
        let trimmed = frac.trim_end_matches('0');
        let frac = if trimmed.len() < 2 { &frac[..2] } else { trimmed };
        write!(f, "{}.{}", whole, frac)
    }
}
