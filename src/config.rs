use std::ffi::OsString;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use reqwest::Url;
use thiserror::Error;

use crate::clients::{GeocoderConfig, TransitConfig};
use crate::pipeline::PipelineSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Cli(#[from] clap::Error),
    #[error("missing value for {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Google Maps API key for the geocoding fallback
    #[arg(long, env = "GOOGLE__MAPS__KEY", hide_env_values = true)]
    pub google_maps_key: String,

    /// Base URL of the transit stop API
    #[arg(
        long,
        env = "TRANSIT_BASE_URL",
        default_value = "https://www.transantiago.cl/restservice/rest"
    )]
    pub transit_base_url: String,

    /// Base URL of the geocoding API
    #[arg(
        long,
        env = "GEOCODER_BASE_URL",
        default_value = "https://maps.googleapis.com/maps/api"
    )]
    pub geocoder_base_url: String,

    /// Directory holding the success/failure/fatal artifacts and logs
    #[arg(long, env = "OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Stops resolved at the same time
    #[arg(long, env = "STOP_CONCURRENCY", default_value = "5")]
    pub concurrency: NonZeroUsize,

    /// Pause before each transit detail request, in milliseconds
    #[arg(long, env = "REQUEST_DELAY_MS", default_value = "100")]
    pub request_delay_ms: u64,

    /// Appended to every geocoding query
    #[arg(long, env = "GEOCODE_REGION", default_value = "Santiago, Chile")]
    pub geocode_region: String,

    /// HTTP connect timeout in milliseconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT_MS", default_value = "3000")]
    pub connect_timeout_ms: u64,

    /// HTTP total request timeout in milliseconds
    #[arg(long, env = "HTTP_TOTAL_TIMEOUT_MS", default_value = "30000")]
    pub total_timeout_ms: u64,

    /// Log output format
    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, default_value = "json")]
    pub log_format: LogFormat,
}

impl Config {
    /// Parses flags (falling back to environment variables) and validates them.
    ///
    /// # Errors
    /// Returns [`ConfigError::Cli`] for parse failures and `--help`/`--version`,
    /// and the other variants when a value fails validation.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::try_parse_from(args)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Fails on an empty API key, a malformed base URL or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.google_maps_key.trim().is_empty() {
            return Err(ConfigError::Missing("GOOGLE__MAPS__KEY"));
        }
        validate_url("TRANSIT_BASE_URL", &self.transit_base_url)?;
        validate_url("GEOCODER_BASE_URL", &self.geocoder_base_url)?;
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "HTTP_CONNECT_TIMEOUT_MS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.total_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "HTTP_TOTAL_TIMEOUT_MS",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            concurrency: self.concurrency,
            request_delay: Duration::from_millis(self.request_delay_ms),
            geocode_region: self.geocode_region.clone(),
        }
    }

    #[must_use]
    pub fn transit_config(&self) -> TransitConfig {
        TransitConfig {
            base_url: self.transit_base_url.clone(),
            connect_timeout: self.connect_timeout(),
            total_timeout: self.total_timeout(),
        }
    }

    #[must_use]
    pub fn geocoder_config(&self) -> GeocoderConfig {
        GeocoderConfig {
            base_url: self.geocoder_base_url.clone(),
            api_key: self.google_maps_key.clone(),
            connect_timeout: self.connect_timeout(),
            total_timeout: self.total_timeout(),
        }
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("google_maps_key", &redact(&self.google_maps_key))
            .field("transit_base_url", &self.transit_base_url)
            .field("geocoder_base_url", &self.geocoder_base_url)
            .field("output_dir", &self.output_dir)
            .field("concurrency", &self.concurrency)
            .field("request_delay_ms", &self.request_delay_ms)
            .field("geocode_region", &self.geocode_region)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("total_timeout_ms", &self.total_timeout_ms)
            .field("log_format", &self.log_format)
            .finish()
    }
}

fn validate_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|error| ConfigError::Invalid {
        name,
        reason: error.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("{value} cannot carry a path"),
        });
    }
    Ok(())
}

/// Keeps the first four characters of a secret.
pub(crate) fn redact(input: &str) -> String {
    let prefix: String = input.chars().take(4).collect();
    if input.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{prefix}***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Config, ConfigError> {
        let mut args = vec!["stop-locator", "--google-maps-key", "AIzaSyExample"];
        args.extend_from_slice(extra);
        Config::from_args(args)
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--concurrency",
            "2",
            "--request-delay-ms",
            "0",
            "--output-dir",
            "/tmp/stops",
            "--geocode-region",
            "Valparaiso, Chile",
            "--log-format",
            "text",
        ])
        .expect("config should parse");

        let settings = config.pipeline_settings();
        assert_eq!(settings.concurrency.get(), 2);
        assert_eq!(settings.request_delay, Duration::ZERO);
        assert_eq!(settings.geocode_region, "Valparaiso, Chile");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/stops"));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.geocoder_config().api_key, "AIzaSyExample");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let error = parse(&["--concurrency", "0"]).expect_err("zero must fail");
        assert!(matches!(error, ConfigError::Cli(_)));
    }

    #[test]
    fn blank_key_is_rejected() {
        let error = Config::from_args(["stop-locator", "--google-maps-key", "  "])
            .expect_err("blank key must fail");
        assert!(matches!(error, ConfigError::Missing("GOOGLE__MAPS__KEY")));
    }

    #[test]
    fn malformed_url_is_rejected() {
        let error = parse(&["--transit-base-url", "transantiago"]).expect_err("must fail");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: "TRANSIT_BASE_URL",
                ..
            }
        ));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let error = parse(&["--total-timeout-ms", "0"]).expect_err("must fail");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: "HTTP_TOTAL_TIMEOUT_MS",
                ..
            }
        ));
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let config = parse(&[]).expect("config should parse");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("AIzaSyExample"));
        assert!(rendered.contains("AIza***"));
    }

    #[test]
    fn redact_hides_short_secrets_entirely() {
        assert_eq!(redact("abc"), "****");
        assert_eq!(redact("abcdef"), "abcd***");
    }
}
