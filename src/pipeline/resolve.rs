use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::persist::{Artifact, OutcomeRecorder};
use super::validate::{Coordinates, coerce_number, validate};
use super::{PipelineError, PipelineSettings, StopOutcome};
use crate::clients::{GeocodeLookup, PlaceGeocoder, TransitSource};
use crate::schema::{PlaceCandidate, ResolvedStop, StopRecord};

/// Per-stop result before the fatal boundary is applied.
enum Attempt {
    Settled(StopOutcome),
    QuotaExhausted,
}

/// Resolves one stop: cache check, fetch, geocoding fallback, record.
pub struct StopResolver {
    transit: Arc<dyn TransitSource>,
    geocoder: Arc<dyn PlaceGeocoder>,
    recorder: Arc<OutcomeRecorder>,
    request_delay: Duration,
    geocode_region: String,
}

impl StopResolver {
    pub fn new(
        transit: Arc<dyn TransitSource>,
        geocoder: Arc<dyn PlaceGeocoder>,
        recorder: Arc<OutcomeRecorder>,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            transit,
            geocoder,
            recorder,
            request_delay: settings.request_delay,
            geocode_region: settings.geocode_region.clone(),
        }
    }

    #[must_use]
    pub fn recorder(&self) -> &OutcomeRecorder {
        &self.recorder
    }

    /// Resolves `stop` into exactly one outcome.
    ///
    /// Errors raised while processing the stop are recorded as
    /// [`StopOutcome::Fatal`] and do not escape.
    ///
    /// # Errors
    /// [`PipelineError::QuotaExhausted`] when the geocoder refuses further
    /// requests, and [`PipelineError::Persist`] when the fatal outcome itself
    /// cannot be written.
    pub async fn resolve(&self, stop: &str) -> Result<StopOutcome, PipelineError> {
        match self.attempt(stop).await {
            Ok(Attempt::Settled(outcome)) => Ok(outcome),
            Ok(Attempt::QuotaExhausted) => Err(PipelineError::QuotaExhausted {
                stop: stop.to_string(),
            }),
            Err(error) => {
                let message = format!("{error:#}");
                warn!(stop, error = %message, "stop resolution failed");
                let line = self
                    .recorder
                    .record(stop, Artifact::Fatal(&message))
                    .await
                    .map_err(|source| PipelineError::Persist {
                        stop: stop.to_string(),
                        source,
                    })?;
                Ok(StopOutcome::Fatal { message, line })
            }
        }
    }

    async fn attempt(&self, stop: &str) -> Result<Attempt> {
        let cached = match self.recorder.has_success(stop).await {
            Ok(cached) => cached,
            Err(error) => {
                warn!(stop, error = %error, "cache check failed, resolving anyway");
                false
            }
        };
        if cached {
            return Ok(Attempt::Settled(StopOutcome::Cached));
        }

        sleep(self.request_delay).await;

        let record = self
            .transit
            .stop_details(stop)
            .await
            .with_context(|| format!("failed to fetch details for stop {stop}"))?;
        if !record.valid {
            return Ok(Attempt::Settled(StopOutcome::Invalid));
        }

        let mut lat = coerce_number(record.x.as_ref());
        let mut lng = coerce_number(record.y.as_ref());
        let mut google_maps = None;

        if !validate(lat, lng) {
            let query = self.geocode_query(&record);
            debug!(stop, query = %query, "transit position unusable, geocoding");

            let lookup = self
                .geocoder
                .find_places(&query)
                .await
                .with_context(|| format!("failed to geocode stop {stop}"))?;
            let candidates = match lookup {
                GeocodeLookup::QuotaExhausted => return Ok(Attempt::QuotaExhausted),
                GeocodeLookup::Found(candidates) => candidates,
            };

            let top = candidates.into_iter().next();
            let location = top.as_ref().and_then(PlaceCandidate::location);
            lat = location.map_or(f64::NAN, |l| l.lat);
            lng = location.map_or(f64::NAN, |l| l.lng);
            google_maps = top;
        }

        let coordinates = Coordinates::new(lat, lng);
        let resolved = ResolvedStop::new(record, google_maps, coordinates);
        let line = self
            .recorder
            .record(stop, Artifact::Resolved(&resolved))
            .await
            .with_context(|| format!("failed to record outcome for stop {stop}"))?;

        let outcome = if coordinates.is_some() {
            StopOutcome::Success {
                record: resolved,
                line,
            }
        } else {
            StopOutcome::Failure {
                record: resolved,
                line,
            }
        };
        Ok(Attempt::Settled(outcome))
    }

    /// `"<paradero>-<nomett>, <region>"`; missing locators render empty.
    fn geocode_query(&self, record: &StopRecord) -> String {
        let code = record.paradero.as_deref().unwrap_or_default();
        let name = record.nomett.as_deref().unwrap_or_default();
        if self.geocode_region.is_empty() {
            format!("{code}-{name}")
        } else {
            format!("{code}-{name}, {}", self.geocode_region)
        }
    }
}

impl std::fmt::Debug for StopResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopResolver")
            .field("recorder", &self.recorder)
            .field("request_delay", &self.request_delay)
            .field("geocode_region", &self.geocode_region)
            .finish_non_exhaustive()
    }
}
