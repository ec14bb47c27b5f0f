//! Shared application state.

use crate::config::AppConfig;
use pricewatch_alerts::{
    AlertBroadcaster, PushDelivery, PushNotifier, PushNotifierConfig, SubscriptionExpired,
};
use pricewatch_scraper::{DocumentFetcher, ScrapeResult, SelectorEngine};
use pricewatch_tracker::{PollScheduler, PriceChecker, SchedulerConfig, TrackingRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Components shared by the HTTP handlers and background tasks.
pub struct AppState {
    pub registry: Arc<TrackingRegistry>,
    pub checker: PriceChecker,
    pub broadcaster: Arc<AlertBroadcaster>,
    pub push: Arc<PushNotifier>,
    pub scheduler: Arc<PollScheduler>,
}

pub type SharedState = Arc<AppState>;

/// Build the selector engine, honoring a configured candidate list.
pub fn build_engine(config: &AppConfig) -> ScrapeResult<SelectorEngine> {
    match &config.selectors {
        Some(candidates) if !candidates.is_empty() => {
            info!(count = candidates.len(), "Using configured price selectors");
            SelectorEngine::from_selectors(candidates)
        }
        _ => Ok(SelectorEngine::default()),
    }
}

/// Wire the components together.
///
/// Returns the receiver for expired push subscriptions; see
/// [`run_expiry_handler`].
pub fn create_state(
    config: &AppConfig,
    engine: SelectorEngine,
    fetcher: Arc<dyn DocumentFetcher>,
    delivery: Arc<dyn PushDelivery>,
) -> (SharedState, mpsc::Receiver<SubscriptionExpired>) {
    let registry = Arc::new(TrackingRegistry::new());
    let broadcaster = Arc::new(AlertBroadcaster::new(config.alerts.queue_capacity));
    let checker = PriceChecker::new(fetcher, Arc::new(engine));

    let (push, expired_rx) =
        PushNotifier::new(delivery, PushNotifierConfig::from(&config.alerts));

    let scheduler = Arc::new(PollScheduler::new(
        Arc::clone(&registry),
        checker.clone(),
        Arc::clone(&broadcaster),
        SchedulerConfig::from(&config.poll),
    ));

    let state = Arc::new(AppState {
        registry,
        checker,
        broadcaster,
        push: Arc::new(push),
        scheduler,
    });
    (state, expired_rx)
}

/// Stop tracking every item whose push subscription expired.
pub async fn run_expiry_handler(
    state: SharedState,
    mut expired_rx: mpsc::Receiver<SubscriptionExpired>,
) {
    while let Some(expired) = expired_rx.recv().await {
        warn!(
            endpoint = %expired.endpoint,
            items = expired.item_ids.len(),
            "Push subscription expired, stopping dependent trackers"
        );
        for id in &expired.item_ids {
            state.registry.untrack(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::FixedPoint;

    #[test]
    fn test_build_engine_with_configured_selectors() {
        let config = AppConfig {
            selectors: Some(vec![".cost".to_string(), "#amount".to_string()]),
            ..Default::default()
        };
        let engine = build_engine(&config).unwrap();
        // Split-price strategy always leads.
        assert_eq!(engine.strategies().len(), 3);
        assert_eq!(engine.strategies()[1].id(), ".cost");
    }

    #[test]
    fn test_build_engine_rejects_bad_selector() {
        let config = AppConfig {
            selectors: Some(vec!["[[".to_string()]),
            ..Default::default()
        };
        assert!(build_engine(&config).is_err());
    }

    #[tokio::test]
    async fn test_expiry_handler_untracks_items() {
        let (state, _fetcher) = crate::testing::test_state();
        let (tx, rx) = mpsc::channel(4);
        let target = FixedPoint::from_f64(10.0);
        state.registry.track("a", "https://shop.example/a", target).unwrap();
        state.registry.track("b", "https://shop.example/b", target).unwrap();
        state.registry.track("c", "https://shop.example/c", target).unwrap();

        tx.send(SubscriptionExpired {
            endpoint: "https://push.example/1".to_string(),
            item_ids: vec!["a".to_string(), "b".to_string()],
        })
        .await
        .unwrap();
        drop(tx);

        run_expiry_handler(Arc::clone(&state), rx).await;

        assert!(state.registry.get("a").is_none());
        assert!(state.registry.get("b").is_none());
        assert!(state.registry.get("c").is_some());
    }
}
