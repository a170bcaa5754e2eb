//! Stop resolution pipeline.
//!
//! The driver lists every stop, normalizes the identifiers and resolves them
//! under a fixed concurrency bound. Each stop ends in exactly one
//! [`StopOutcome`]; only quota exhaustion and recorder failures abort the run.

pub mod driver;
pub mod persist;
pub mod resolve;
pub mod validate;

use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use thiserror::Error;

use crate::schema::ResolvedStop;

pub use driver::{PipelineDriver, normalize_stop_ids};
pub use persist::{Artifact, OutcomeRecorder};
pub use resolve::StopResolver;
pub use validate::{Coordinates, coerce_number, validate};

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_GEOCODE_REGION: &str = "Santiago, Chile";

/// Run-level failures. Everything else is contained at the stop boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("geocoding quota exhausted while resolving stop {stop}")]
    QuotaExhausted { stop: String },
    #[error("failed to list stops: {0:#}")]
    ListStops(#[source] anyhow::Error),
    #[error("failed to prepare output directory: {0}")]
    Prepare(#[source] std::io::Error),
    #[error("failed to record outcome for stop {stop}: {source}")]
    Persist {
        stop: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bucket deciding where an outcome is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeClass {
    Success,
    Failure,
    Fatal,
}

impl OutcomeClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for OutcomeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of resolving one stop.
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// A success artifact already existed; nothing was fetched.
    Cached,
    /// The transit source flagged the stop as unusable.
    Invalid,
    Success { record: ResolvedStop, line: String },
    Failure { record: ResolvedStop, line: String },
    /// Processing raised an error; `message` is what was recorded.
    Fatal { message: String, line: String },
}

impl StopOutcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Invalid => "invalid",
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failure",
            Self::Fatal { .. } => "fatal",
        }
    }

    #[must_use]
    pub const fn class(&self) -> Option<OutcomeClass> {
        match self {
            Self::Cached | Self::Invalid => None,
            Self::Success { .. } => Some(OutcomeClass::Success),
            Self::Failure { .. } => Some(OutcomeClass::Failure),
            Self::Fatal { .. } => Some(OutcomeClass::Fatal),
        }
    }

    /// The aggregate log line written for this outcome, if any.
    #[must_use]
    pub fn line(&self) -> Option<&str> {
        match self {
            Self::Cached | Self::Invalid => None,
            Self::Success { line, .. } | Self::Failure { line, .. } | Self::Fatal { line, .. } => {
                Some(line)
            }
        }
    }
}

/// Tunables shared by the driver and the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub concurrency: NonZeroUsize,
    /// Pause before every transit detail request.
    pub request_delay: Duration,
    /// Appended to geocoding queries to bias them to the served area.
    pub geocode_region: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN),
            request_delay: DEFAULT_REQUEST_DELAY,
            geocode_region: DEFAULT_GEOCODE_REGION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopReport {
    /// 1-based position in the normalized stop list.
    pub position: usize,
    pub stop: String,
    pub outcome: StopOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub cached: usize,
    pub invalid: usize,
    pub success: usize,
    pub failure: usize,
    pub fatal: usize,
}

/// Every stop of a completed run, ordered by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub stops: Vec<StopReport>,
}

impl RunReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.stops.len()
    }

    #[must_use]
    pub fn counts(&self) -> OutcomeCounts {
        self.stops
            .iter()
            .fold(OutcomeCounts::default(), |mut counts, report| {
                match report.outcome {
                    StopOutcome::Cached => counts.cached += 1,
                    StopOutcome::Invalid => counts.invalid += 1,
                    StopOutcome::Success { .. } => counts.success += 1,
                    StopOutcome::Failure { .. } => counts.failure += 1,
                    StopOutcome::Fatal { .. } => counts.fatal += 1,
                }
                counts
            })
    }

    #[must_use]
    pub fn outcome_of(&self, stop: &str) -> Option<&StopOutcome> {
        self.stops
            .iter()
            .find(|report| report.stop == stop)
            .map(|report| &report.outcome)
    }
}
