//! Polling the TfL arrivals feed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use railtrack_transit::prelude::*;
use reqwest::Url;
use tracing::{debug, warn};

use super::estimator::{LiveTrackEstimator, UpdateSummary};
use super::prediction::ArrivalPrediction;
use crate::config::LiveTrackConfig;
use crate::error::{EngineError, Result};

pub const TFL_API_BASE: &str = "https://api.tfl.gov.uk";

/// The `/Line/{line}/Arrivals` endpoint for one line
#[derive(Clone, Debug)]
pub struct ArrivalsFeed {
    base_url: String,
    line_id: String,
    app_key: Option<String>,
}

impl ArrivalsFeed {
    pub fn new(line_id: impl Into<String>) -> Self {
        Self {
            base_url: TFL_API_BASE.to_string(),
            line_id: line_id.into(),
            app_key: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_app_key(mut self, app_key: Option<String>) -> Self {
        self.app_key = app_key.filter(|key| !key.is_empty());
        self
    }

    pub fn line_id(&self) -> &str {
        &self.line_id
    }

    pub fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| EngineError::FeedFetch(format!("invalid base url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| EngineError::FeedFetch(format!("base url {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["Line", self.line_id.as_str(), "Arrivals"]);
        if let Some(key) = &self.app_key {
            url.query_pairs_mut().append_pair("app_key", key);
        }
        Ok(url)
    }

    pub async fn fetch(&self, fetcher: &dyn DataFetcher) -> Result<Vec<ArrivalPrediction>> {
        let url = self.url()?;
        let bytes = fetcher
            .fetch(url.as_str())
            .await
            .map_err(|e| EngineError::FeedFetch(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// `DataFetcher` over HTTP
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::FeedFetch(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl DataFetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = railtrack_transit::Result<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| TransitError::FetchError(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TransitError::FetchError(format!("HTTP {status} {body}")));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| TransitError::FetchError(format!("read failed: {e}")))?;
            Ok(bytes.to_vec())
        })
    }
}

/// Feeds one line's arrivals into a live track estimator
pub struct LiveTracker<F: DataFetcher> {
    feed: ArrivalsFeed,
    fetcher: F,
    railway: Arc<Railway>,
    lookup: StationLookup,
    estimator: LiveTrackEstimator,
}

impl<F: DataFetcher> LiveTracker<F> {
    pub fn new(
        feed: ArrivalsFeed,
        fetcher: F,
        railway: Arc<Railway>,
        lookup: StationLookup,
        config: LiveTrackConfig,
    ) -> Self {
        Self {
            feed,
            fetcher,
            railway,
            lookup,
            estimator: LiveTrackEstimator::new(config),
        }
    }

    pub fn estimator(&self) -> &LiveTrackEstimator {
        &self.estimator
    }

    pub fn railway(&self) -> &Arc<Railway> {
        &self.railway
    }

    /// Fetch and apply one poll at `now` (epoch ms).
    ///
    /// When the fetch fails the existing records are kept and keep
    /// extrapolating; only those past the staleness window are retired.
    pub async fn poll(&mut self, now: f64) -> Result<UpdateSummary> {
        match self.feed.fetch(&self.fetcher).await {
            Ok(predictions) => {
                let summary = self
                    .estimator
                    .update(&predictions, &self.railway, &self.lookup, now);
                debug!(
                    line = self.feed.line_id(),
                    predictions = predictions.len(),
                    placed = summary.placed,
                    preserved = summary.preserved,
                    retired = summary.retired,
                    "live poll"
                );
                Ok(summary)
            }
            Err(error) => {
                warn!(line = self.feed.line_id(), %error, "live poll failed");
                self.estimator.retire_stale(now);
                Err(error)
            }
        }
    }
}
