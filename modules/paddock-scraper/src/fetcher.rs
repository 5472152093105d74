// Rate-limited, retrying page fetcher.
//
// Every attempt, retries included, passes through the shared RateLimiter.
// Timeouts, 5xx and transport errors back off (`base * 2^attempt`) and retry;
// 4xx returns immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use scraper::Html;
use tracing::{debug, warn};

use paddock_common::Config;

use crate::encoding::{charset_from_content_type, decode_body};
use crate::error::{FetchError, Result};
use crate::rate_limit::RateLimiter;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A fetched page, already decoded to text.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub html: String,
    pub encoding: &'static str,
}

impl Page {
    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Anything that can turn a URL into a page. The HTTP fetcher in production,
/// `MockPages` in tests.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<Page, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Minimum spacing between requests, also the backoff base.
    pub request_delay: Duration,
}

impl From<&Config> for FetchSettings {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.request_timeout,
            max_attempts: config.max_retries,
            request_delay: config.request_delay,
        }
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl HttpFetcher {
    /// Build a fetcher with its own limiter spaced at `settings.request_delay`.
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(settings.request_delay));
        Self::with_limiter(settings, limiter)
    }

    /// Build a fetcher that shares an existing limiter.
    pub fn with_limiter(settings: &FetchSettings, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            limiter,
            max_attempts: settings.max_attempts.max(1),
            backoff_base: settings.request_delay,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt.min(16))
    }

    async fn attempt(&self, url: &str) -> std::result::Result<Page, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = resp.status();
        if status.is_client_error() {
            return Err(FetchError::Client {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Server {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let declared = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type)
            .map(str::to_string);

        let bytes = resp.bytes().await.map_err(|e| transport_error(url, e))?;
        let decoded = decode_body(&bytes, declared.as_deref());
        if decoded.lossy {
            warn!(url, bytes = bytes.len(), "No candidate encoding decoded cleanly, using lossy UTF-8");
        }

        debug!(url, encoding = decoded.encoding.name(), bytes = bytes.len(), "Fetched page");

        Ok(Page {
            url: url.to_string(),
            html: decoded.text,
            encoding: decoded.encoding.name(),
        })
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Page, FetchError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;

            let err = match self.attempt(url).await {
                Ok(page) => return Ok(page),
                Err(e) => e,
            };

            if err.is_permanent() {
                warn!(url, error = %err, "Client error, not retrying");
                return Err(err);
            }

            attempt += 1;
            warn!(
                url,
                attempt,
                max_attempts = self.max_attempts,
                error = %err,
                "Fetch attempt failed"
            );

            if attempt >= self.max_attempts {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let wait = self.backoff(attempt - 1);
            debug!(url, wait_ms = wait.as_millis() as u64, "Backing off before retry");
            tokio::time::sleep(wait).await;
        }
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
