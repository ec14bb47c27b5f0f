//! Price alert produced when a tracked item reaches its target.

use crate::{FixedPoint, TrackedItem};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Immutable alert value, broadcast to every live subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceAlert {
    pub item_id: String,
    pub url: String,
    pub current_price: FixedPoint,
    pub target_price: FixedPoint,
    /// Price as it appeared on the page.
    pub display_price: String,
    pub timestamp: DateTime<Utc>,
}

impl PriceAlert {
    /// Alert for an item that crossed its threshold.
    pub fn for_item(item: &TrackedItem, current_price: FixedPoint, display_price: &str) -> Self {
        Self {
            item_id: item.id.clone(),
            url: item.url.clone(),
            current_price,
            target_price: item.target_price,
            display_price: display_price.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Flat record sent to realtime clients.
    pub fn to_payload(&self) -> AlertPayload {
        AlertPayload {
            id: self.item_id.clone(),
            url: self.url.clone(),
            current_price: self.current_price.to_f64(),
            target_price: self.target_price.to_f64(),
            price_string: self.display_price.clone(),
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Wire form of a [`PriceAlert`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub id: String,
    pub url: String,
    pub current_price: f64,
    pub target_price: f64,
    pub price_string: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}
