//! Tracked item state.

use crate::FixedPoint;
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A product page being watched for a price drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    /// Caller-supplied identifier, unique within the registry.
    pub id: String,
    /// Product page URL.
    pub url: String,
    /// Alert once the observed price is at or below this value.
    pub target_price: FixedPoint,
    /// Strategy that last located the price, reused as the fast path.
    pub selector: Option<CompactString>,
    /// Most recent observed price (zero until the first successful check).
    pub last_price: FixedPoint,
    /// When tracking started.
    pub created_at: DateTime<Utc>,
}

impl TrackedItem {
    /// Create a new item with no observation yet.
    pub fn new(id: impl Into<String>, url: impl Into<String>, target_price: FixedPoint) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            target_price,
            selector: None,
            last_price: FixedPoint::ZERO,
            created_at: Utc::now(),
        }
    }

    /// True until the first successful check.
    #[inline]
    pub fn is_unobserved(&self) -> bool {
        self.last_price.is_zero()
    }

    /// Whether `price` meets the alert threshold.
    #[inline]
    pub fn is_at_or_below_target(&self, price: FixedPoint) -> bool {
        price <= self.target_price
    }
}
