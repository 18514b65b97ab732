//! Retrieval of raw feed bytes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::constants::DEFAULT_FETCH_TIMEOUT;
use crate::error::{FeedMirrorError, FeedMirrorResult};

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the raw body of the feed at `url`.
    async fn fetch(&self, url: &str) -> FeedMirrorResult<Vec<u8>>;
}

/// Rewrite `webcal://` to `https://` and reject anything but http(s).
pub fn normalize_feed_url(raw: &str) -> FeedMirrorResult<String> {
    let trimmed = raw.trim();
    let rewritten = match trimmed.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("webcal") => {
            format!("https://{rest}")
        }
        _ => trimmed.to_string(),
    };

    let parsed = url::Url::parse(&rewritten)
        .map_err(|e| FeedMirrorError::Config(format!("Invalid feed URL '{raw}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        other => Err(FeedMirrorError::Config(format!(
            "Unsupported URL scheme '{other}' in '{raw}'"
        ))),
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> FeedMirrorResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("feedmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedMirrorError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(HttpFetcher { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn get(&self, url: &str) -> FeedMirrorResult<Vec<u8>> {
        let transport = |e: reqwest::Error| FeedMirrorError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedMirrorError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FeedMirrorResult<Vec<u8>> {
        let url = normalize_feed_url(url)?;
        tracing::debug!(%url, "fetching feed");

        match tokio::time::timeout(self.timeout, self.get(&url)).await {
            Ok(result) => result,
            Err(_) => Err(FeedMirrorError::FetchTimeout {
                url,
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        HttpFetcher {
            client: reqwest::Client::new(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Canned response for `StaticFetcher`.
#[derive(Debug, Clone)]
pub enum StaticResponse {
    Body(Vec<u8>),
    Status(u16),
    Transport(String),
    Timeout,
}

/// In-process fetcher serving fixed bodies, for tests and offline runs.
///
/// Unknown URLs answer with HTTP 404. Failures queued with `fail_next` are
/// served before the configured response.
#[derive(Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, StaticResponse>>,
    queued_failures: Mutex<HashMap<String, Vec<StaticResponse>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(url: &str, body: impl Into<Vec<u8>>) -> Self {
        let fetcher = Self::new();
        fetcher.set_body(url, body);
        fetcher
    }

    pub fn set_body(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.set_response(url, StaticResponse::Body(body.into()));
    }

    pub fn set_response(&self, url: &str, response: StaticResponse) {
        self.responses.lock().insert(url.to_string(), response);
    }

    /// Serve `response` for the next fetch of `url`, once per call.
    pub fn fail_next(&self, url: &str, response: StaticResponse) {
        self.queued_failures
            .lock()
            .entry(url.to_string())
            .or_default()
            .push(response);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FeedFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> FeedMirrorResult<Vec<u8>> {
        *self.calls.lock().entry(url.to_string()).or_default() += 1;

        let queued = {
            let mut queued = self.queued_failures.lock();
            match queued.get_mut(url) {
                Some(list) if !list.is_empty() => Some(list.remove(0)),
                _ => None,
            }
        };
        let response = match queued {
            Some(response) => response,
            None => self
                .responses
                .lock()
                .get(url)
                .cloned()
                .unwrap_or(StaticResponse::Status(404)),
        };

        match response {
            StaticResponse::Body(body) => Ok(body),
            StaticResponse::Status(status) => Err(FeedMirrorError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            StaticResponse::Transport(message) => Err(FeedMirrorError::Transport {
                url: url.to_string(),
                message,
            }),
            StaticResponse::Timeout => Err(FeedMirrorError::FetchTimeout {
                url: url.to_string(),
                secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            }),
        }
    }
}
