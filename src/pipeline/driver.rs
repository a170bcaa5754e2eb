use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{error, info, warn};

use super::persist::OutcomeRecorder;
use super::resolve::StopResolver;
use super::{PipelineError, PipelineSettings, RunReport, StopOutcome, StopReport};
use crate::clients::{PlaceGeocoder, TransitSource};

/// Upper-cases, sorts and deduplicates the stop list.
///
/// Codes that cannot be used as a file name (empty, `.`/`..`, or containing a
/// path separator) are dropped.
#[must_use]
pub fn normalize_stop_ids<I, S>(stops: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = stops
        .into_iter()
        .map(|stop| stop.as_ref().to_uppercase())
        .filter(|stop| {
            let usable = is_usable_stop_id(stop);
            if !usable {
                warn!(stop = %stop, "skipping stop code that cannot name an artifact");
            }
            usable
        })
        .collect();
    normalized.sort_unstable();
    normalized.dedup();
    normalized
}

fn is_usable_stop_id(stop: &str) -> bool {
    !stop.is_empty() && stop != "." && stop != ".." && !stop.contains(['/', '\\'])
}

/// Walks every stop through the resolver under a fixed concurrency bound.
pub struct PipelineDriver {
    transit: Arc<dyn TransitSource>,
    resolver: StopResolver,
    concurrency: NonZeroUsize,
}

impl PipelineDriver {
    pub fn new(
        transit: Arc<dyn TransitSource>,
        geocoder: Arc<dyn PlaceGeocoder>,
        recorder: Arc<OutcomeRecorder>,
        settings: &PipelineSettings,
    ) -> Self {
        let resolver = StopResolver::new(Arc::clone(&transit), geocoder, recorder, settings);
        Self {
            transit,
            resolver,
            concurrency: settings.concurrency,
        }
    }

    /// Resolves every listed stop.
    ///
    /// On a run-level error the stream is dropped right away: stops not yet
    /// started never start, and in-flight ones are abandoned with whatever they
    /// already wrote left on disk.
    ///
    /// # Errors
    /// See [`PipelineError`].
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        self.resolver
            .recorder()
            .prepare()
            .await
            .map_err(PipelineError::Prepare)?;

        let listed = self
            .transit
            .list_stops()
            .await
            .map_err(PipelineError::ListStops)?;
        let listed_count = listed.len();
        let stops = normalize_stop_ids(listed);
        let total = stops.len();
        info!(
            listed = listed_count,
            total,
            concurrency = self.concurrency.get(),
            "resolving stops"
        );

        let resolver = &self.resolver;
        let mut completions = stream::iter(stops.into_iter().enumerate())
            .map(|(index, stop)| async move {
                let result = resolver.resolve(&stop).await;
                (index + 1, stop, result)
            })
            .buffer_unordered(self.concurrency.get());

        let mut reports = Vec::with_capacity(total);
        while let Some((position, stop, result)) = completions.next().await {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(stop = %stop, position, total, error = %err, "aborting run");
                    return Err(err);
                }
            };
            log_progress(position, total, &stop, &outcome);
            reports.push(StopReport {
                position,
                stop,
                outcome,
            });
        }

        reports.sort_unstable_by_key(|report| report.position);
        let report = RunReport { stops: reports };
        let counts = report.counts();
        info!(
            total,
            cached = counts.cached,
            invalid = counts.invalid,
            success = counts.success,
            failure = counts.failure,
            fatal = counts.fatal,
            "run complete"
        );
        Ok(report)
    }
}

fn log_progress(position: usize, total: usize, stop: &str, outcome: &StopOutcome) {
    let label = outcome.label();
    match outcome.line() {
        Some(line) => info!(
            outcome = label,
            position,
            total,
            stop,
            line = line.trim_end(),
            "stop resolved"
        ),
        None => info!(outcome = label, position, total, stop, "stop resolved"),
    }
}
