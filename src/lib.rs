#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions, // e.g. PipelineError in pipeline module
    clippy::missing_errors_doc       // Errors are documented on the public entry points only
)]

pub mod app;
pub mod clients;
pub mod config;
pub mod observability;
pub mod pipeline;
pub mod schema;

pub use config::Config;
pub use pipeline::{PipelineDriver, PipelineError, RunReport, StopOutcome};
