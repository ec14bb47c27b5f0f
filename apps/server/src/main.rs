//! Price Watch - Headless Server
//!
//! Tracks product pages for price drops and streams alerts to clients.

mod config;
mod routes;
mod state;
mod ws_server;

use clap::Parser;
use config::AppConfig;
use pricewatch_alerts::{DisabledPushDelivery, PushDelivery, WebPushDelivery};
use pricewatch_scraper::{FetchConfig, HttpFetcher};
use state::{build_engine, create_state, run_expiry_handler};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Price Watch CLI
#[derive(Parser, Debug)]
#[command(name = "pricewatch")]
#[command(about = "Product price drop tracker", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// HTTP port, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Poll interval in seconds, overrides the config file
    #[arg(long)]
    interval_secs: Option<u64>,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn init_logging(level: &str) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Build the push transport. Without a VAPID key, notifications are dropped.
fn build_delivery(
    config: &AppConfig,
) -> Result<Arc<dyn PushDelivery>, Box<dyn std::error::Error + Send + Sync>> {
    let Some(path) = config.alerts.vapid_private_key_path.as_deref() else {
        warn!("No VAPID private key configured, push notifications are disabled");
        return Ok(Arc::new(DisabledPushDelivery));
    };

    let pem = std::fs::read(path)?;
    let delivery = WebPushDelivery::new(
        pem,
        config.alerts.vapid_subject.clone(),
        Duration::from_secs(config.alerts.push_ttl_secs),
        Duration::from_secs(config.alerts.push_timeout_secs.max(1)),
    )?;
    info!(key = path, "Web Push delivery enabled");
    Ok(Arc::new(delivery))
}

/// Apply command-line overrides on top of the loaded config.
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(interval) = args.interval_secs {
        config.poll.interval_secs = interval;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = AppConfig::load(&args.config)?;
    apply_overrides(&mut config, &args);

    info!("Price Watch starting...");
    info!("  Port: {}", config.server.port);
    info!("  Poll interval: {}s", config.poll.interval_secs);
    info!("  Check timeout: {}s", config.poll.check_timeout_secs);

    let engine = build_engine(&config)?;
    info!("  Price strategies: {}", engine.strategies().len());

    let fetcher = Arc::new(HttpFetcher::new(&FetchConfig::from(&config.fetch))?);
    let delivery = build_delivery(&config)?;

    let (state, expired_rx) = create_state(&config, engine, fetcher, delivery);

    let scheduler_handle = tokio::spawn(Arc::clone(&state.scheduler).run());

    let push_handle = tokio::spawn(
        Arc::clone(&state.push).run(Arc::clone(&state.broadcaster)),
    );

    let expiry_handle = tokio::spawn(run_expiry_handler(Arc::clone(&state), expired_rx));

    let server_handle = ws_server::start_server(
        Arc::clone(&state),
        config.server.port,
        config.server.allowed_origin.as_deref(),
    )
    .await?;

    info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;

    warn!("Shutdown signal received");
    state.scheduler.stop();
    let _ = tokio::time::timeout(Duration::from_secs(2), scheduler_handle).await;

    state.push.stop();
    let _ = tokio::time::timeout(Duration::from_secs(2), push_handle).await;

    server_handle.abort();
    expiry_handle.abort();

    info!(
        tracked = state.registry.len(),
        "Price Watch stopped"
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::AppConfig;
    use crate::state::{create_state, SharedState};
    use async_trait::async_trait;
    use pricewatch_alerts::{DeliveryOutcome, NotificationPayload, PushDelivery, PushSubscription};
    use pricewatch_scraper::{DocumentFetcher, ScrapeError, ScrapeResult, SelectorEngine};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    pub fn price_page(price: &str) -> String {
        format!(
            r#"<html><body><span class="price">{}</span></body></html>"#,
            price
        )
    }

    /// Serves fixed pages; unknown URLs answer 404.
    #[derive(Default)]
    pub struct StaticFetcher {
        pages: Mutex<HashMap<String, String>>,
    }

    impl StaticFetcher {
        pub fn push_page(&self, url: &str, html: String) {
            self.pages.lock().unwrap().insert(url.to_string(), html);
        }
    }

    #[async_trait]
    impl DocumentFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> ScrapeResult<String> {
            self.pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or(ScrapeError::Status(404))
        }
    }

    struct AcceptAll;

    #[async_trait]
    impl PushDelivery for AcceptAll {
        async fn deliver(
            &self,
            _subscription: &PushSubscription,
            _payload: &NotificationPayload,
        ) -> DeliveryOutcome {
            DeliveryOutcome::Delivered
        }
    }

    pub fn test_state() -> (SharedState, Arc<StaticFetcher>) {
        let fetcher = Arc::new(StaticFetcher::default());
        let (state, _expired_rx) = create_state(
            &AppConfig::default(),
            SelectorEngine::default(),
            fetcher.clone(),
            Arc::new(AcceptAll),
        );
        (state, fetcher)
    }
}
