//! Price tracking: registry of watched items and the poller that checks them.
//!
//! ## Architecture
//!
//! - `registry` - Tracked items and the atomic crossing decision
//! - `checker` - One fetch plus price location for a URL
//! - `scheduler` - Interval loop spawning one check task per item
//!
//! A crossing removes the item and publishes a [`pricewatch_core::PriceAlert`]
//! through the [`pricewatch_alerts::AlertBroadcaster`].

pub mod checker;
pub mod error;
pub mod registry;
pub mod scheduler;

pub use checker::*;
pub use error::*;
pub use registry::*;
pub use scheduler::*;

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use pricewatch_scraper::{DocumentFetcher, ScrapeError, ScrapeResult};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use tokio::sync::{watch, Notify};

    /// Minimal product page with the price in a `.price` span.
    pub fn price_page(price: &str) -> String {
        format!(
            r#"<html><body><h1>Widget</h1><span class="price">{}</span></body></html>"#,
            price
        )
    }

    /// Serves queued pages per URL. The last page repeats once the queue drains.
    #[derive(Default)]
    pub struct ScriptedFetcher {
        pages: Mutex<HashMap<String, VecDeque<String>>>,
        fetches: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_page(&self, url: &str, html: String) {
            self.pages
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(html);
        }

        pub fn fetch_count(&self, url: &str) -> usize {
            self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl DocumentFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> ScrapeResult<String> {
            *self
                .fetches
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default() += 1;

            let mut pages = self.pages.lock().unwrap();
            let queue = pages.get_mut(url).ok_or(ScrapeError::Status(404))?;
            let page = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            page.ok_or(ScrapeError::Status(404))
        }
    }

    /// Holds every fetch until `release` is called.
    pub struct BlockingFetcher {
        page: String,
        started: Notify,
        released: watch::Sender<bool>,
    }

    impl BlockingFetcher {
        pub fn new(page: String) -> Self {
            let (released, _) = watch::channel(false);
            Self {
                page,
                started: Notify::new(),
                released,
            }
        }

        pub async fn wait_started(&self) {
            self.started.notified().await;
        }

        pub fn release(&self) {
            self.released.send_replace(true);
        }
    }

    #[async_trait]
    impl DocumentFetcher for BlockingFetcher {
        async fn fetch(&self, _url: &str) -> ScrapeResult<String> {
            self.started.notify_one();
            let mut released = self.released.subscribe();
            while !*released.borrow_and_update() {
                if released.changed().await.is_err() {
                    break;
                }
            }
            Ok(self.page.clone())
        }
    }
}
