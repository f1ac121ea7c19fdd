//! Error types emitted by the `eta` CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use eta_core::EstimateError;
use eta_data::{LoaderBuildError, LocationParseError, SourceError};
use thiserror::Error;

use crate::wire::RequestValidationError;

/// Errors emitted by the `eta` CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// An option was present but outside its accepted range.
    #[error("invalid {field} {value}: {reason}")]
    InvalidArgument {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    /// The speed table location could not be parsed.
    #[error(transparent)]
    SpeedTableLocation(#[from] LocationParseError),
    /// The speed table source could not be opened.
    #[error("failed to open speed table source {location}: {source}")]
    OpenSpeedTable {
        location: String,
        #[source]
        source: SourceError,
    },
    /// The speed table loader could not be constructed.
    #[error(transparent)]
    BuildLoader(#[from] LoaderBuildError),
    /// The Tokio runtime could not be created.
    #[error("failed to build Tokio runtime: {0}")]
    BuildRuntime(#[source] std::io::Error),
    /// The HTTP server failed to bind or stopped with an error.
    #[error("HTTP server on {listen} failed: {source}")]
    Serve {
        listen: String,
        #[source]
        source: std::io::Error,
    },
    /// Opening the estimate request file failed.
    #[error("failed to open estimate request at {path:?}: {source}")]
    OpenEstimateRequest {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Estimate request JSON could not be decoded.
    #[error("failed to parse estimate request JSON at {path:?}: {source}")]
    ParseEstimateRequest {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The estimate request payload failed validation.
    #[error("estimate request in {path:?} failed validation: {source}")]
    InvalidEstimateRequest {
        path: Utf8PathBuf,
        #[source]
        source: RequestValidationError,
    },
    /// The engine rejected or abandoned the request.
    #[error("estimate failed: {0}")]
    Estimate(#[source] EstimateError),
    /// Serializing the estimate response failed.
    #[error("failed to serialize estimate response: {0}")]
    SerializeEstimateResponse(#[source] serde_json::Error),
    /// Writing the estimate output failed.
    #[error("failed to write estimate output: {0}")]
    WriteEstimateOutput(#[source] std::io::Error),
}
