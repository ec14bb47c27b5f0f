//! Tracked item registry.
//!
//! Per-key mutation goes through `DashMap` entries, so an observation and the
//! removal it may trigger happen under one lock. `list` copies items out; no
//! caller ever iterates the live map.

use crate::error::RegistryError;
use compact_str::CompactString;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pricewatch_core::{FixedPoint, TrackedItem};
use pricewatch_scraper::validate_url;
use tracing::{debug, info};

/// What a recorded observation means for its item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossingDecision {
    /// First successful check, still above target.
    FirstObservation,
    /// Still above target.
    NoCrossing,
    /// At or below target. The item has been removed; this is its final state.
    ThresholdCrossed(TrackedItem),
}

/// Thread-safe map of tracked items keyed by id.
#[derive(Debug, Default)]
pub struct TrackingRegistry {
    items: DashMap<String, TrackedItem>,
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `url` under `id`.
    pub fn track(&self, id: &str, url: &str, target_price: FixedPoint) -> Result<(), RegistryError> {
        if id.trim().is_empty() {
            return Err(RegistryError::InvalidInput("id must not be empty".to_string()));
        }
        if target_price.is_zero() {
            return Err(RegistryError::InvalidInput(
                "target price must be positive".to_string(),
            ));
        }
        validate_url(url).map_err(|e| RegistryError::InvalidInput(e.to_string()))?;

        match self.items.entry(id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(TrackedItem::new(id, url, target_price));
                info!(item = id, url = url, target = %target_price, "Tracking started");
                Ok(())
            }
        }
    }

    /// Stop tracking `id`. Returns whether it was tracked.
    pub fn untrack(&self, id: &str) -> bool {
        let removed = self.items.remove(id).is_some();
        if removed {
            info!(item = id, "Tracking stopped");
        }
        removed
    }

    /// Copy of one item.
    pub fn get(&self, id: &str) -> Option<TrackedItem> {
        self.items.get(id).map(|r| r.value().clone())
    }

    /// Copies of all items.
    pub fn list(&self) -> Vec<TrackedItem> {
        self.items.iter().map(|r| r.value().clone()).collect()
    }

    /// Store an observed price and decide whether the target was reached.
    ///
    /// Returns `None` when `id` is no longer tracked; the observation is
    /// dropped and the item is not re-created.
    pub fn record_observation(
        &self,
        id: &str,
        price: FixedPoint,
        strategy_id: &str,
    ) -> Option<CrossingDecision> {
        let Entry::Occupied(mut entry) = self.items.entry(id.to_string()) else {
            debug!(item = id, "Discarding observation for untracked item");
            return None;
        };

        let item = entry.get_mut();
        let first = item.is_unobserved();
        if item.selector.as_deref() != Some(strategy_id) {
            if let Some(previous) = &item.selector {
                info!(item = id, from = %previous, to = strategy_id, "Price selector changed");
            }
            item.selector = Some(CompactString::new(strategy_id));
        }
        if item.last_price != price {
            debug!(item = id, from = %item.last_price, to = %price, "Price updated");
            item.last_price = price;
        }

        if item.is_at_or_below_target(price) {
            return Some(CrossingDecision::ThresholdCrossed(entry.remove()));
        }

        if first {
            Some(CrossingDecision::FirstObservation)
        } else {
            Some(CrossingDecision::NoCrossing)
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
