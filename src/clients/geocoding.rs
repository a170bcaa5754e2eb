//! Google Geocoding API client used as the coordinate fallback.
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use super::error_excerpt;
use crate::config::redact;
use crate::schema::PlaceCandidate;

/// Answer of a place search.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeLookup {
    /// The provider refuses further requests for this key.
    QuotaExhausted,
    /// Ranked candidates, best first. May be empty.
    Found(Vec<PlaceCandidate>),
}

/// Free-text place search.
#[async_trait]
pub trait PlaceGeocoder: Send + Sync {
    async fn find_places(&self, query: &str) -> Result<GeocodeLookup>;
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceCandidate>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

impl fmt::Debug for GeocoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocoderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("connect_timeout", &self.connect_timeout)
            .field("total_timeout", &self.total_timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct GoogleGeocoder {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl GoogleGeocoder {
    /// Builds the client.
    ///
    /// # Errors
    /// Fails when the base URL does not parse or the HTTP client cannot be built.
    pub fn new(config: GeocoderConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .gzip(true)
            .build()
            .context("failed to build geocoding HTTP client")?;

        let mut endpoint =
            Url::parse(&config.base_url).context("invalid geocoding base URL")?;
        endpoint
            .path_segments_mut()
            .map_err(|()| anyhow!("geocoding base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["geocode", "json"]);

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key,
        })
    }
}

impl fmt::Debug for GoogleGeocoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleGeocoder")
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PlaceGeocoder for GoogleGeocoder {
    async fn find_places(&self, query: &str) -> Result<GeocodeLookup> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("address", query)
            .append_pair("key", &self.api_key);

        // reqwest errors print the request URL, which carries the key.
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("geocoding request failed")?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(%status, "geocoding provider is throttling this key");
            return Ok(GeocodeLookup::QuotaExhausted);
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "geocoding API returned error status {status}: {}",
                error_excerpt(&error_body)
            );
        }

        let payload = response
            .json::<GeocodeResponse>()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to deserialize geocoding response")?;

        debug!(
            query,
            status = %payload.status,
            candidates = payload.results.len(),
            "geocoding response received"
        );

        classify(payload)
    }
}

fn classify(payload: GeocodeResponse) -> Result<GeocodeLookup> {
    match payload.status.as_str() {
        "OK" => Ok(GeocodeLookup::Found(payload.results)),
        "ZERO_RESULTS" => Ok(GeocodeLookup::Found(Vec::new())),
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => Ok(GeocodeLookup::QuotaExhausted),
        other => match payload.error_message {
            Some(message) => anyhow::bail!("geocoding API returned status {other}: {message}"),
            None => anyhow::bail!("geocoding API returned status {other}"),
        },
    }
}
