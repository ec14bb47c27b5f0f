//! Periodic polling of tracked items.
//!
//! Every tick snapshots the registry and spawns one detached task per item.
//! An id whose previous check is still running is skipped, so checks for the
//! same item never overlap even when a fetch outlives the interval.

use crate::checker::PriceChecker;
use crate::registry::{CrossingDecision, TrackingRegistry};
use dashmap::DashSet;
use pricewatch_alerts::AlertBroadcaster;
use pricewatch_core::{PriceAlert, TrackedItem};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Scheduler timing.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between polls.
    pub interval: Duration,
    /// Upper bound on one item's check, fetch included.
    pub check_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(20),
        }
    }
}

/// Result of checking one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Fetch or extraction failed; the item is unchanged.
    Failed,
    /// The item was untracked while its check ran.
    Discarded,
    /// Observation stored.
    Recorded(CrossingDecision),
}

/// Removes the id from the in-flight set when the check task ends.
struct InFlightGuard {
    set: Arc<DashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

pub struct PollScheduler {
    registry: Arc<TrackingRegistry>,
    checker: PriceChecker,
    broadcaster: Arc<AlertBroadcaster>,
    config: SchedulerConfig,
    in_flight: Arc<DashSet<String>>,
    shutdown: watch::Sender<bool>,
}

impl PollScheduler {
    pub fn new(
        registry: Arc<TrackingRegistry>,
        checker: PriceChecker,
        broadcaster: Arc<AlertBroadcaster>,
        config: SchedulerConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            checker,
            broadcaster,
            config,
            in_flight: Arc::new(DashSet::new()),
            shutdown,
        }
    }

    /// Poll until [`stop`](Self::stop) is called.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return;
        }

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; the first poll waits one interval.
        ticker.tick().await;

        info!(
            interval_secs = self.config.interval.as_secs(),
            "Poll scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let spawned = self.tick().len();
                    debug!(spawned, "Poll tick");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Poll scheduler stopped");
    }

    /// Stop the polling loop. Checks already running are left to finish.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Spawn a check for every tracked item not already being checked.
    pub fn tick(self: &Arc<Self>) -> Vec<JoinHandle<CheckOutcome>> {
        let items = self.registry.list();
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            if !self.in_flight.insert(item.id.clone()) {
                debug!(item = %item.id, "Previous check still running, skipping");
                continue;
            }
            let guard = InFlightGuard {
                set: Arc::clone(&self.in_flight),
                id: item.id.clone(),
            };
            let scheduler = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let _guard = guard;
                scheduler.check_item(item).await
            }));
        }

        handles
    }

    /// Check one item and act on the result.
    pub async fn check_item(&self, item: TrackedItem) -> CheckOutcome {
        let check = self.checker.check(&item.url, item.selector.as_deref());
        let result = match tokio::time::timeout(self.config.check_timeout, check).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(
                    item = %item.id,
                    url = %item.url,
                    error = %e,
                    transient = e.is_transient(),
                    "Price check failed"
                );
                return CheckOutcome::Failed;
            }
            Err(_) => {
                warn!(
                    item = %item.id,
                    url = %item.url,
                    timeout_secs = self.config.check_timeout.as_secs(),
                    "Price check timed out"
                );
                return CheckOutcome::Failed;
            }
        };

        let Some(decision) =
            self.registry
                .record_observation(&item.id, result.price, &result.strategy_id)
        else {
            return CheckOutcome::Discarded;
        };

        match &decision {
            CrossingDecision::ThresholdCrossed(crossed) => {
                info!(
                    item = %crossed.id,
                    price = %result.price,
                    target = %crossed.target_price,
                    "Target price reached"
                );
                let alert = PriceAlert::for_item(crossed, result.price, &result.display_text);
                self.broadcaster.publish(&alert);
            }
            CrossingDecision::FirstObservation => {
                info!(
                    item = %item.id,
                    price = %result.price,
                    target = %item.target_price,
                    strategy = %result.strategy_id,
                    "First price observed"
                );
            }
            CrossingDecision::NoCrossing => {
                debug!(item = %item.id, price = %result.price, "Still above target");
            }
        }

        CheckOutcome::Recorded(decision)
    }

    /// Number of checks currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{price_page, BlockingFetcher, ScriptedFetcher};
    use pretty_assertions::assert_eq;
    use pricewatch_core::FixedPoint;
    use pricewatch_scraper::{DocumentFetcher, SelectorEngine};

    const URL: &str = "https://shop.example/p/1";

    struct Fixture {
        registry: Arc<TrackingRegistry>,
        broadcaster: Arc<AlertBroadcaster>,
        scheduler: Arc<PollScheduler>,
    }

    fn fixture(fetcher: Arc<dyn DocumentFetcher>, config: SchedulerConfig) -> Fixture {
        let registry = Arc::new(TrackingRegistry::new());
        let broadcaster = Arc::new(AlertBroadcaster::default());
        let checker = PriceChecker::new(fetcher, Arc::new(SelectorEngine::default()));
        let scheduler = Arc::new(PollScheduler::new(
            Arc::clone(&registry),
            checker,
            Arc::clone(&broadcaster),
            config,
        ));
        Fixture {
            registry,
            broadcaster,
            scheduler,
        }
    }

    fn price(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    async fn run_tick(scheduler: &Arc<PollScheduler>) -> Vec<CheckOutcome> {
        let mut outcomes = Vec::new();
        for handle in scheduler.tick() {
            outcomes.push(handle.await.unwrap());
        }
        outcomes
    }

    #[tokio::test]
    async fn test_end_to_end_drop_below_target() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_page(URL, price_page("$120.00"));
        fetcher.push_page(URL, price_page("$95.00"));
        let f = fixture(fetcher.clone(), SchedulerConfig::default());
        let mut subscriber = f.broadcaster.subscribe();

        f.registry.track("a", URL, price("100")).unwrap();

        let outcomes = run_tick(&f.scheduler).await;
        assert_eq!(
            outcomes,
            vec![CheckOutcome::Recorded(CrossingDecision::FirstObservation)]
        );
        let item = f.registry.get("a").unwrap();
        assert_eq!(item.last_price, price("120"));
        assert_eq!(item.selector.as_deref(), Some(".price"));
        assert!(subscriber.try_recv().is_none());

        let outcomes = run_tick(&f.scheduler).await;
        assert!(matches!(
            outcomes.as_slice(),
            [CheckOutcome::Recorded(CrossingDecision::ThresholdCrossed(_))]
        ));
        assert!(f.registry.list().is_empty());

        let alert = subscriber.try_recv().unwrap();
        assert_eq!(alert.item_id, "a");
        assert_eq!(alert.url, URL);
        assert_eq!(alert.current_price, price("95"));
        assert_eq!(alert.target_price, price("100"));
        assert_eq!(alert.display_price, "$95.00");
        assert!(subscriber.try_recv().is_none());

        // Nothing left to poll.
        assert!(run_tick(&f.scheduler).await.is_empty());
        assert_eq!(fetcher.fetch_count(URL), 2);
    }

    #[tokio::test]
    async fn test_failed_check_leaves_item_unchanged() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_page(URL, "<html><body>maintenance</body></html>".to_string());
        let f = fixture(fetcher, SchedulerConfig::default());
        f.registry.track("a", URL, price("100")).unwrap();
        let before = f.registry.get("a").unwrap();

        assert_eq!(run_tick(&f.scheduler).await, vec![CheckOutcome::Failed]);
        assert_eq!(f.registry.get("a").unwrap(), before);
    }

    #[tokio::test]
    async fn test_zero_price_placeholder_is_not_an_observation() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_page(URL, price_page("$120.00"));
        fetcher.push_page(URL, price_page("$0.00"));
        let f = fixture(fetcher, SchedulerConfig::default());
        let mut subscriber = f.broadcaster.subscribe();
        f.registry.track("a", URL, price("100")).unwrap();

        run_tick(&f.scheduler).await;
        assert_eq!(run_tick(&f.scheduler).await, vec![CheckOutcome::Failed]);

        assert_eq!(f.registry.get("a").unwrap().last_price, price("120"));
        assert!(subscriber.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unknown_url_fails_without_touching_others() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_page(URL, price_page("150"));
        let f = fixture(fetcher, SchedulerConfig::default());
        f.registry.track("a", URL, price("100")).unwrap();
        f.registry
            .track("b", "https://shop.example/missing", price("100"))
            .unwrap();

        let outcomes = run_tick(&f.scheduler).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.contains(&CheckOutcome::Failed));
        assert!(outcomes.contains(&CheckOutcome::Recorded(CrossingDecision::FirstObservation)));
        assert_eq!(f.registry.len(), 2);
    }

    #[tokio::test]
    async fn test_untrack_during_check_discards_result() {
        let fetcher = Arc::new(BlockingFetcher::new(price_page("50")));
        let f = fixture(fetcher.clone(), SchedulerConfig::default());
        let mut subscriber = f.broadcaster.subscribe();
        f.registry.track("a", URL, price("100")).unwrap();

        let handles = f.scheduler.tick();
        fetcher.wait_started().await;
        f.registry.untrack("a");
        fetcher.release();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }
        assert_eq!(outcomes, vec![CheckOutcome::Discarded]);
        assert!(f.registry.get("a").is_none());
        assert!(subscriber.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_overlapping_check_is_skipped() {
        let fetcher = Arc::new(BlockingFetcher::new(price_page("150")));
        let f = fixture(fetcher.clone(), SchedulerConfig::default());
        f.registry.track("a", URL, price("100")).unwrap();

        let first = f.scheduler.tick();
        assert_eq!(first.len(), 1);
        assert_eq!(f.scheduler.in_flight_count(), 1);

        let second = f.scheduler.tick();
        assert!(second.is_empty());

        fetcher.release();
        for handle in first {
            handle.await.unwrap();
        }
        assert_eq!(f.scheduler.in_flight_count(), 0);
        assert_eq!(f.scheduler.tick().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_check_times_out() {
        let fetcher = Arc::new(BlockingFetcher::new(price_page("50")));
        let config = SchedulerConfig {
            interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(2),
        };
        let f = fixture(fetcher, config);
        f.registry.track("a", URL, price("100")).unwrap();

        assert_eq!(run_tick(&f.scheduler).await, vec![CheckOutcome::Failed]);
        assert_eq!(f.registry.len(), 1);
        assert_eq!(f.scheduler.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_on_interval_until_stopped() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.push_page(URL, price_page("150"));
        let config = SchedulerConfig {
            interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(20),
        };
        let f = fixture(fetcher.clone(), config);
        f.registry.track("a", URL, price("100")).unwrap();

        let handle = tokio::spawn(Arc::clone(&f.scheduler).run());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fetcher.fetch_count(URL), 0);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(fetcher.fetch_count(URL), 1);
        assert_eq!(f.registry.get("a").unwrap().last_price, price("150"));

        f.scheduler.stop();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fetcher.fetch_count(URL), 1);
    }

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.check_timeout, Duration::from_secs(20));
    }
}
