//! Application configuration.

use pricewatch_alerts::{PushNotifierConfig, DEFAULT_QUEUE_CAPACITY};
use pricewatch_scraper::{FetchConfig, DEFAULT_MAX_BODY_BYTES};
use pricewatch_tracker::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable overriding the push notification icon.
pub const PUSH_ICON_ENV: &str = "PRICEWATCH_PUSH_ICON";

/// Environment variable naming the VAPID private key PEM file.
pub const VAPID_KEY_ENV: &str = "PRICEWATCH_VAPID_PRIVATE_KEY";

/// Environment variable overriding the VAPID `sub` claim.
pub const VAPID_SUBJECT_ENV: &str = "PRICEWATCH_VAPID_SUBJECT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Polling settings.
    pub poll: PollSettings,
    /// Page fetch settings.
    pub fetch: FetchSettings,
    /// Alert delivery settings.
    pub alerts: AlertSettings,
    /// Replaces the built-in CSS candidates when set.
    pub selectors: Option<Vec<String>>,
}

impl AppConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay non-empty values from the environment.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(icon) = var(PUSH_ICON_ENV) {
            self.alerts.push_icon = icon;
        }
        if let Some(path) = var(VAPID_KEY_ENV) {
            self.alerts.vapid_private_key_path = Some(path);
        }
        if let Some(subject) = var(VAPID_SUBJECT_ENV) {
            self.alerts.vapid_subject = subject;
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen port.
    pub port: u16,
    /// Allowed CORS origin. Any origin when unset.
    pub allowed_origin: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            allowed_origin: None,
        }
    }
}

/// Polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Seconds between polls.
    pub interval_secs: u64,
    /// Upper bound on one item's check in seconds.
    pub check_timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            check_timeout_secs: 20,
        }
    }
}

impl From<&PollSettings> for SchedulerConfig {
    fn from(settings: &PollSettings) -> Self {
        SchedulerConfig {
            interval: Duration::from_secs(settings.interval_secs.max(1)),
            check_timeout: Duration::from_secs(settings.check_timeout_secs.max(1)),
        }
    }
}

/// Page fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// User-Agent override.
    pub user_agent: Option<String>,
    /// Largest page body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            connect_timeout_secs: 5,
            user_agent: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&FetchSettings> for FetchConfig {
    fn from(settings: &FetchSettings) -> Self {
        let defaults = FetchConfig::default();
        FetchConfig {
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs.max(1)),
            user_agent: settings
                .user_agent
                .clone()
                .unwrap_or(defaults.user_agent),
            max_body_bytes: settings.max_body_bytes.max(1),
        }
    }
}

/// Alert delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Per-subscriber queue capacity.
    pub queue_capacity: usize,
    /// Icon shown with push notifications.
    pub push_icon: String,
    /// Push message TTL in seconds.
    pub push_ttl_secs: u64,
    /// Push request timeout in seconds.
    pub push_timeout_secs: u64,
    /// VAPID private key PEM file. Push delivery is disabled when unset.
    pub vapid_private_key_path: Option<String>,
    /// VAPID `sub` claim.
    pub vapid_subject: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            push_icon: PushNotifierConfig::default().icon,
            push_ttl_secs: 3600,
            push_timeout_secs: 10,
            vapid_private_key_path: None,
            vapid_subject: "mailto:admin@localhost".to_string(),
        }
    }
}

impl From<&AlertSettings> for PushNotifierConfig {
    fn from(settings: &AlertSettings) -> Self {
        PushNotifierConfig {
            icon: settings.push_icon.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.poll.interval_secs, 30);
        assert_eq!(config.fetch.timeout_secs, 15);
        assert_eq!(config.alerts.queue_capacity, 256);
        assert_eq!(config.alerts.push_icon, "/vite.svg");
        assert_eq!(config.alerts.push_ttl_secs, 3600);
        assert!(config.alerts.vapid_private_key_path.is_none());
        assert_eq!(config.fetch.max_body_bytes, 5 * 1024 * 1024);
        assert!(config.selectors.is_none());
    }

    #[test]
    fn test_poll_settings_to_scheduler_config() {
        let settings = PollSettings {
            interval_secs: 0,
            check_timeout_secs: 7,
        };
        let config: SchedulerConfig = (&settings).into();
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.check_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_fetch_settings_keep_default_user_agent() {
        let config: FetchConfig = (&FetchSettings::default()).into();
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.user_agent, FetchConfig::default().user_agent);
    }

    #[test]
    fn test_fetch_settings_clamp_zero_timeouts() {
        let settings = FetchSettings {
            timeout_secs: 0,
            connect_timeout_secs: 0,
            max_body_bytes: 1024,
            ..Default::default()
        };
        let config: FetchConfig = (&settings).into();
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.max_body_bytes, 1024);
    }

    #[test]
    fn test_env_overrides_push_settings() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            VAPID_KEY_ENV => Some("/etc/pricewatch/vapid.pem".to_string()),
            VAPID_SUBJECT_ENV => Some("mailto:ops@example.com".to_string()),
            PUSH_ICON_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(
            config.alerts.vapid_private_key_path.as_deref(),
            Some("/etc/pricewatch/vapid.pem")
        );
        assert_eq!(config.alerts.vapid_subject, "mailto:ops@example.com");
        // Empty values are ignored.
        assert_eq!(config.alerts.push_icon, "/vite.svg");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"poll": {"interval_secs": 60}, "selectors": [".cost"]}"#)
                .unwrap();
        assert_eq!(config.poll.interval_secs, 60);
        assert_eq!(config.poll.check_timeout_secs, 20);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.selectors, Some(vec![".cost".to_string()]));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = AppConfig::load("/nonexistent/pricewatch.json").unwrap();
        assert_eq!(config.poll.interval_secs, 30);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.alerts.push_icon, config.alerts.push_icon);
        assert_eq!(parsed.fetch.connect_timeout_secs, config.fetch.connect_timeout_secs);
    }
}
