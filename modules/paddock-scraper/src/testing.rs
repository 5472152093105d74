// Test doubles for the PageSource seam.
//
// MockPages is a URL→response map. Unregistered URLs answer like a 404 so
// scrapers see the same failure they would against the live site.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::fetcher::{Page, PageSource};

// ---------------------------------------------------------------------------
// MockPages
// ---------------------------------------------------------------------------

/// Builder pattern: `.on_page()`, `.on_error()`, `.with_latency()`.
#[derive(Default)]
pub struct MockPages {
    pages: HashMap<String, String>,
    errors: HashMap<String, FetchError>,
    latency: Option<Duration>,
    requests: Mutex<Vec<String>>,
}

impl MockPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn on_error(mut self, url: &str, error: FetchError) -> Self {
        self.errors.insert(url.to_string(), error);
        self
    }

    /// Delay every response, so cancellation has something to interrupt.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every URL requested so far, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl PageSource for MockPages {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(err) = self.errors.get(url) {
            return Err(err.clone());
        }
        match self.pages.get(url) {
            Some(html) => Ok(Page {
                url: url.to_string(),
                html: html.clone(),
                encoding: "UTF-8",
            }),
            None => Err(FetchError::Client {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

/// A transient failure that has already used up its retries.
pub fn exhausted(url: &str) -> FetchError {
    FetchError::Exhausted {
        url: url.to_string(),
        attempts: 3,
        last: Box::new(FetchError::Server {
            status: 503,
            url: url.to_string(),
        }),
    }
}
