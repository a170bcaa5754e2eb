//! Transit authority client: lists stop codes and fetches per-stop records.
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error_excerpt;
use crate::schema::StopRecord;

/// Source of stop identifiers and raw stop records.
#[async_trait]
pub trait TransitSource: Send + Sync {
    async fn list_stops(&self) -> Result<Vec<String>>;

    async fn stop_details(&self, code: &str) -> Result<StopRecord>;
}

#[derive(Debug, Clone)]
pub struct TransitConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TransitClient {
    client: Client,
    base_url: Url,
}

impl TransitClient {
    /// Builds the client.
    ///
    /// # Errors
    /// Fails when the base URL does not parse or the HTTP client cannot be built.
    pub fn new(config: TransitConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .gzip(true)
            .build()
            .context("failed to build transit HTTP client")?;

        let base_url = Url::parse(&config.base_url).context("invalid transit base URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("transit base URL cannot carry a path: {base_url}");
        }

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("transit base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("transit {what} request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "transit API returned error status {status} for {what}: {}",
                error_excerpt(&error_body)
            );
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to deserialize transit {what} response"))
    }
}

#[async_trait]
impl TransitSource for TransitClient {
    async fn list_stops(&self) -> Result<Vec<String>> {
        let url = self.endpoint(&["stops"])?;
        let stops: Vec<String> = self.get_json(url, "stop list").await?;
        debug!(count = stops.len(), "fetched stop list");
        Ok(stops)
    }

    async fn stop_details(&self, code: &str) -> Result<StopRecord> {
        let url = self.endpoint(&["stops", code])?;
        self.get_json(url, "stop details").await
    }
}
