use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_BACKOFF_SECS: f64 = 60.0;

const USER_AGENTS: &[&str] = &[
    // Chrome (Windows)
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    // Chrome (Mac)
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/17.0 Chrome/125.0.6422.76 Safari/537.36",
    // Firefox
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0",
    // Safari (Mac)
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_0) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";
const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const CONNECTION_VALUE: &str = "keep-alive";

/// Header values sent with one request attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_agent: &'static str,
    pub accept_language: &'static str,
    pub accept: &'static str,
    pub connection: &'static str,
}

impl RequestIdentity {
    /// Pick a user agent uniformly from the pool; the other headers are fixed.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let user_agent = USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0]);
        RequestIdentity {
            user_agent,
            accept_language: ACCEPT_LANGUAGE_VALUE,
            accept: ACCEPT_VALUE,
            connection: CONNECTION_VALUE,
        }
    }

    pub fn headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_static(self.user_agent));
        h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(self.accept_language));
        h.insert(ACCEPT, HeaderValue::from_static(self.accept));
        h.insert(CONNECTION, HeaderValue::from_static(self.connection));
        h
    }
}

/// A fetched page, whatever its status.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub url: String,
    pub body: String,
}

/// Transport-level fault: DNS, timeout, connection reset, unreadable body.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to get response from {url} after {attempts} attempts")]
    Exhausted { url: String, attempts: u32 },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Issues a single GET. Non-200 statuses are returned, not raised.
pub trait Transport {
    async fn get(
        &self,
        url: &str,
        identity: &RequestIdentity,
        timeout: Duration,
    ) -> Result<Page, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(8))
            .build()?;
        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        identity: &RequestIdentity,
        timeout: Duration,
    ) -> Result<Page, TransportError> {
        let rsp = self
            .client
            .get(url)
            .headers(identity.headers())
            .timeout(timeout)
            .send()
            .await?;
        // Capture these before .text() consumes the response
        let status = rsp.status().as_u16();
        let final_url = rsp.url().to_string();
        let body = rsp.text().await?;
        Ok(Page {
            status,
            url: final_url,
            body,
        })
    }
}

pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// `min(60, 2^attempt) + jitter` seconds.
pub fn backoff_delay(attempt: u32, jitter: f64) -> Duration {
    let base = 2f64.powi(attempt.min(16) as i32).min(MAX_BACKOFF_SECS);
    Duration::from_secs_f64(base + jitter)
}

/// GET with a fresh request identity per attempt and exponential backoff
/// between failed attempts.
pub struct Fetcher<T, S, R> {
    transport: T,
    sleeper: S,
    rng: R,
    timeout: Duration,
}

pub type HttpFetcher = Fetcher<HttpTransport, TokioSleeper, StdRng>;

impl HttpFetcher {
    pub fn http(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Fetcher::new(
            HttpTransport::new()?,
            TokioSleeper,
            StdRng::from_os_rng(),
            timeout,
        ))
    }
}

impl<T: Transport, S: Sleeper, R: Rng> Fetcher<T, S, R> {
    pub fn new(transport: T, sleeper: S, rng: R, timeout: Duration) -> Self {
        Fetcher {
            transport,
            sleeper,
            rng,
            timeout,
        }
    }

    /// Returns the first 200 response, or `FetchError::Exhausted` after
    /// exactly `max_retries` failed attempts.
    pub async fn fetch(&mut self, url: &str, max_retries: u32) -> Result<Page, FetchError> {
        for attempt in 0..max_retries {
            let identity = RequestIdentity::random(&mut self.rng);
            match self.transport.get(url, &identity, self.timeout).await {
                Ok(page) if page.status == 200 => {
                    debug!(
                        "Fetched {} -> {} (attempt {}, {} bytes)",
                        url,
                        page.url,
                        attempt,
                        page.body.len()
                    );
                    return Ok(page);
                }
                Ok(page) => warn!("Attempt {}: got status {} for {}", attempt, page.status, url),
                Err(e) => warn!("Attempt {}: request to {} failed: {}", attempt, url, e),
            }

            if attempt + 1 < max_retries {
                let delay = backoff_delay(attempt, self.rng.random_range(0.0..1.0));
                warn!("Sleeping for {:.2}s and retrying", delay.as_secs_f64());
                self.sleeper.sleep(delay).await;
            }
        }

        warn!("Failed to get response from {} after {} attempts", url, max_retries);
        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: max_retries,
        })
    }
}
