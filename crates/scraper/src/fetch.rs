//! Product page fetching.

use crate::error::{ScrapeError, ScrapeResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default cap on a downloaded page body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Source of raw page HTML.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch the page body. Non-2xx responses are errors.
    async fn fetch(&self, url: &str) -> ScrapeResult<String>;
}

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Pages larger than this are rejected.
    pub max_body_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            user_agent: USER_AGENT.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// `reqwest`-backed fetcher with browser-like headers.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Build a fetcher from config.
    pub fn new(config: &FetchConfig) -> ScrapeResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );
        headers.insert(
            reqwest::header::UPGRADE_INSECURE_REQUESTS,
            reqwest::header::HeaderValue::from_static("1"),
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// Check that a URL is absolute http(s).
pub fn validate_url(raw: &str) -> ScrapeResult<Url> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ScrapeError::InvalidUrl(format!("unsupported scheme '{}'", other))),
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> ScrapeResult<String> {
        let url = validate_url(url)?;
        debug!(url = %url, "Fetching page");

        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status(status.as_u16()));
        }

        let limit = self.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(ScrapeError::BodyTooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            append_capped(&mut body, &chunk, limit)?;
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Append `chunk` unless the body would exceed `limit` bytes.
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> ScrapeResult<()> {
    if body.len() + chunk.len() > limit {
        return Err(ScrapeError::BodyTooLarge { limit });
    }
    body.extend_from_slice(chunk);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://shop.example/p/1").is_ok());
        assert!(validate_url("http://shop.example").is_ok());
        assert!(matches!(
            validate_url("ftp://shop.example/p/1"),
            Err(ScrapeError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(ScrapeError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert!(config.timeout > config.connect_timeout);
        assert!(config.user_agent.starts_with("Mozilla/5.0"));
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn test_body_cap() {
        let mut body = Vec::new();
        append_capped(&mut body, b"<html>", 10).unwrap();
        append_capped(&mut body, b"1234", 10).unwrap();
        assert_eq!(body.len(), 10);

        let err = append_capped(&mut body, b"x", 10).unwrap_err();
        assert!(matches!(err, ScrapeError::BodyTooLarge { limit: 10 }));
        assert_eq!(body, b"<html>1234");
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(&FetchConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_bad_url_before_sending() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher.fetch("mailto:someone@example.com").await.unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidUrl(_)));
    }
}
