use anyhow::{Error, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

/// Installs the global tracing subscriber.
///
/// Verbosity comes from `RUST_LOG` (default `info`). JSON output flattens event
/// fields so progress lines stay greppable.
///
/// # Errors
/// Fails when a global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true).with_target(false))
            .try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init(),
    }
    .map_err(|e| Error::msg(e.to_string()))
}
