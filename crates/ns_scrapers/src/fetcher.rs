use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use ns_core::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::encoding::{charset_from_content_type, DecodeStage, FallbackDecoder};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

type HostLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    /// Minimum spacing between requests to one host. Zero disables it.
    pub politeness_delay: Duration,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            politeness_delay: Duration::from_secs(1),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("{url} returned HTTP {code}")]
    Status { url: String, code: u16 },

    #[error("failed reading body of {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

impl FetchError {
    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        let url = url.to_string();
        if e.is_timeout() {
            FetchError::Timeout { url }
        } else if e.is_connect() {
            FetchError::Connect { url, reason: e.to_string() }
        } else if e.is_body() || e.is_decode() {
            FetchError::Body { url, reason: e.to_string() }
        } else {
            FetchError::Request { url, reason: e.to_string() }
        }
    }
}

/// A successfully fetched and decoded page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// After redirects.
    pub url: String,
    pub status: u16,
    pub text: String,
    pub encoding: &'static str,
    pub stage: DecodeStage,
    pub elapsed: Duration,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError>;
}

pub struct Fetcher {
    client: Client,
    decoder: FallbackDecoder,
    limiter: Option<Arc<HostLimiter>>,
}

impl Fetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);
        headers.insert(ACCEPT, header_value(&config.accept)?);
        headers.insert(ACCEPT_LANGUAGE, header_value(&config.accept_language)?);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        let limiter = Quota::with_period(config.politeness_delay)
            .map(|quota| Arc::new(RateLimiter::keyed(quota)));

        Ok(Self {
            client,
            decoder: FallbackDecoder::default(),
            limiter,
        })
    }

    async fn wait_for_host(&self, host: &str) {
        if let Some(limiter) = &self.limiter {
            let key = host.to_string();
            if limiter.check_key(&key).is_err() {
                debug!(host, "Waiting for politeness delay");
                limiter.until_key_ready(&key).await;
            }
        }
    }
}

#[async_trait]
impl PageFetcher for Fetcher {
    #[instrument(skip(self), fields(status = tracing::field::Empty, encoding = tracing::field::Empty))]
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
        self.wait_for_host(&host).await;

        let started = Instant::now();
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
            .map_err(log_failure)?;

        let status = response.status();
        tracing::Span::current().record("status", status.as_u16());
        if !status.is_success() {
            return Err(log_failure(FetchError::Status {
                url: url.to_string(),
                code: status.as_u16(),
            }));
        }

        let final_url = response.url().to_string();
        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
            .map_err(log_failure)?;

        let decoded = self.decoder.decode(&bytes, declared.as_deref(), tld(&host));
        tracing::Span::current().record("encoding", decoded.encoding.name());
        debug!(
            bytes = bytes.len(),
            stage = %decoded.stage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched page"
        );

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            text: decoded.text,
            encoding: decoded.encoding.name(),
            stage: decoded.stage,
            elapsed: started.elapsed(),
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ns_core::Error::Config(format!("Invalid header value {:?}: {}", value, e)))
}

fn log_failure(e: FetchError) -> FetchError {
    warn!(error = %e, "Fetch failed");
    e
}

pub(crate) fn tld(host: &str) -> Option<&str> {
    host.rsplit('.').next().filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_alphabetic()))
}
