use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fetcher::{
    FetchError, Fetcher, HttpFetcher, HttpTransport, Sleeper, TokioSleeper, Transport,
};
use crate::listings::extract_listings;
use crate::normalize::{normalize, JobRecord, NormalizeError};
use crate::repair::{repair, RepairError};
use crate::settings::Settings;

/// Why one listing produced no record.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Repair(#[from] RepairError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

pub struct RunOutput {
    /// One entry per processed listing URL, in discovery order.
    pub records: Vec<Option<JobRecord>>,
    pub discovered: usize,
    pub cancelled: bool,
}

impl RunOutput {
    pub fn produced(&self) -> usize {
        self.records.iter().flatten().count()
    }
}

/// Index page → listing URLs → one record per listing, strictly sequential.
pub struct Pipeline<T, S, R> {
    fetcher: Fetcher<T, S, R>,
    site_origin: String,
    max_retries: u32,
    cancel: Arc<AtomicBool>,
}

impl Pipeline<HttpTransport, TokioSleeper, StdRng> {
    pub fn http(settings: &Settings, cancel: Arc<AtomicBool>) -> Result<Self> {
        let fetcher = HttpFetcher::http(Duration::from_secs(settings.request_timeout_secs))?;
        Ok(Pipeline::new(
            fetcher,
            settings.site_origin.clone(),
            settings.max_retries,
            cancel,
        ))
    }
}

impl<T: Transport, S: Sleeper, R: Rng> Pipeline<T, S, R> {
    pub fn new(
        fetcher: Fetcher<T, S, R>,
        site_origin: String,
        max_retries: u32,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Pipeline {
            fetcher,
            site_origin,
            max_retries,
            cancel,
        }
    }

    /// Fetch the index page and return its listing URLs. Failing to fetch the
    /// index is fatal.
    pub async fn discover(&mut self, index_url: &str) -> Result<Vec<String>> {
        info!("Fetching index page: {}", index_url);
        let index = self
            .fetcher
            .fetch(index_url, self.max_retries)
            .await
            .with_context(|| format!("Couldn't scrape main page {}", index_url))?;
        Ok(extract_listings(&index.body, &self.site_origin))
    }

    pub async fn run(&mut self, index_url: &str, limit: Option<usize>) -> Result<RunOutput> {
        let mut listings = self.discover(index_url).await?;
        let discovered = listings.len();
        if let Some(n) = limit {
            listings.truncate(n);
        }

        let pb = ProgressBar::new(listings.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        let mut records = Vec::with_capacity(listings.len());
        let mut cancelled = false;

        for url in &listings {
            if self.cancel.load(Ordering::Relaxed) {
                warn!(
                    "Interrupted after {} of {} listings, keeping partial results",
                    records.len(),
                    listings.len()
                );
                cancelled = true;
                break;
            }
            records.push(self.scrape_listing(url).await);
            pb.inc(1);
        }

        pb.finish_and_clear();
        let out = RunOutput {
            records,
            discovered,
            cancelled,
        };
        info!(
            "Scraped {} listings ({} ok, {} skipped)",
            out.records.len(),
            out.produced(),
            out.records.len() - out.produced()
        );
        Ok(out)
    }

    /// Per-listing failures become `None` plus a diagnostic.
    pub async fn scrape_listing(&mut self, url: &str) -> Option<JobRecord> {
        match self.try_scrape_listing(url).await {
            Ok(record) => {
                debug!("Scraped {}", url);
                Some(record)
            }
            Err(e) => {
                warn!("Couldn't scrape jobs page {}: {}", url, e);
                None
            }
        }
    }

    pub async fn try_scrape_listing(&mut self, url: &str) -> Result<JobRecord, ListingError> {
        let page = self.fetcher.fetch(url, self.max_retries).await?;
        let text = repair(&page.body)?;
        Ok(normalize(&text, url)?)
    }
}
