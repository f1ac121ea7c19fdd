//! Layered configuration for the `serve` and `estimate` subcommands.
//!
//! Both subcommands merge defaults, configuration files, `ETA_CMDS_*`
//! environment variables and CLI flags through `ortho_config`, then resolve
//! the merged arguments into the typed settings consumed by the engine.

use std::num::NonZeroUsize;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use eta_core::{DEFAULT_QUEUE_CAPACITY, DEFAULT_SPEED, EstimatorConfig, SpeedCacheConfig};
use eta_data::SpeedTableLocation;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::CliError;

pub(crate) const ARG_SPEED_TABLE: &str = "speed-table";
pub(crate) const ARG_LISTEN: &str = "listen";
pub(crate) const ARG_REQUEST_TIMEOUT_MS: &str = "request-timeout-ms";
pub(crate) const ARG_DEFAULT_SPEED: &str = "default-speed";
pub(crate) const ARG_MAX_AGE_SECS: &str = "speed-table-max-age-secs";
pub(crate) const ARG_WORKERS: &str = "workers";
pub(crate) const ARG_QUEUE_CAPACITY: &str = "queue-capacity";
pub(crate) const ARG_WARM_START: &str = "warm-start";
pub(crate) const ARG_REFRESH_INTERVAL_SECS: &str = "refresh-interval-secs";
pub(crate) const ARG_REQUEST: &str = "request";
pub(crate) const ENV_SERVE_SPEED_TABLE: &str = "ETA_CMDS_SERVE_SPEED_TABLE";
pub(crate) const ENV_ESTIMATE_SPEED_TABLE: &str = "ETA_CMDS_ESTIMATE_SPEED_TABLE";
pub(crate) const ENV_ESTIMATE_REQUEST: &str = "ETA_CMDS_ESTIMATE_REQUEST_PATH";

/// Bucket and key variables honoured when no speed table location is set.
pub(crate) const LEGACY_BUCKET_ENV: &str = "REGION_SPEED_MAP_BUCKET_KEY";
pub(crate) const LEGACY_KEY_ENV: &str = "REGIONAL_SPEED_MAP_KEY";

pub(crate) const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub(crate) const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3_000;

/// CLI arguments for the `serve` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "serve",
    long_about = "Serve POST /compute_travel_estimates. The speed table is \
                 loaded lazily on first use (or up front with --warm-start) \
                 and reloaded once it is older than the staleness window.",
    about = "Run the travel estimate HTTP service"
)]
#[ortho_config(prefix = "ETA")]
pub(crate) struct ServeArgs {
    /// Speed table location (s3://bucket/key, http(s)://..., or a path).
    #[arg(long = ARG_SPEED_TABLE, value_name = "location")]
    #[serde(default)]
    pub(crate) speed_table: Option<String>,
    /// Socket address to listen on.
    #[arg(long = ARG_LISTEN, value_name = "addr")]
    #[serde(default)]
    pub(crate) listen: Option<String>,
    /// Per-request deadline in milliseconds.
    #[arg(long = ARG_REQUEST_TIMEOUT_MS, value_name = "ms")]
    #[serde(default)]
    pub(crate) request_timeout_ms: Option<u64>,
    /// Speed used when the table has no entry for a request.
    #[arg(long = ARG_DEFAULT_SPEED, value_name = "mph")]
    #[serde(default)]
    pub(crate) default_speed: Option<f64>,
    /// Age in seconds after which the speed table is reloaded.
    #[arg(long = ARG_MAX_AGE_SECS, value_name = "secs")]
    #[serde(default)]
    pub(crate) speed_table_max_age_secs: Option<u64>,
    /// Number of estimation worker threads per request.
    #[arg(long = ARG_WORKERS, value_name = "count")]
    #[serde(default)]
    pub(crate) workers: Option<usize>,
    /// Capacity of the work and result queues.
    #[arg(long = ARG_QUEUE_CAPACITY, value_name = "count")]
    #[serde(default)]
    pub(crate) queue_capacity: Option<usize>,
    /// Load the speed table before accepting traffic.
    #[arg(long = ARG_WARM_START, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) warm_start: Option<bool>,
    /// Reload the speed table in the background at this interval.
    #[arg(long = ARG_REFRESH_INTERVAL_SECS, value_name = "secs")]
    #[serde(default)]
    pub(crate) refresh_interval_secs: Option<u64>,
}

impl ServeArgs {
    pub(crate) fn into_config(self) -> Result<ServeConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ServeConfig::resolve(merged, &ambient_env)
    }

    fn engine_fields(&self) -> EngineFields {
        EngineFields {
            speed_table: self.speed_table.clone(),
            request_timeout_ms: self.request_timeout_ms,
            default_speed: self.default_speed,
            speed_table_max_age_secs: self.speed_table_max_age_secs,
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }
}

/// CLI arguments for the `estimate` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "estimate",
    long_about = "Estimate the travel distance and time for every pair in a \
                 JSON request file and print the response to stdout. The \
                 file uses the same shape as the HTTP request body.",
    about = "Estimate a request read from a file"
)]
#[ortho_config(prefix = "ETA")]
pub(crate) struct EstimateArgs {
    /// Path to a JSON file containing an estimate request.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) request_path: Option<Utf8PathBuf>,
    /// Speed table location (s3://bucket/key, http(s)://..., or a path).
    #[arg(long = ARG_SPEED_TABLE, value_name = "location")]
    #[serde(default)]
    pub(crate) speed_table: Option<String>,
    /// Deadline in milliseconds.
    #[arg(long = ARG_REQUEST_TIMEOUT_MS, value_name = "ms")]
    #[serde(default)]
    pub(crate) request_timeout_ms: Option<u64>,
    /// Speed used when the table has no entry for the request.
    #[arg(long = ARG_DEFAULT_SPEED, value_name = "mph")]
    #[serde(default)]
    pub(crate) default_speed: Option<f64>,
    /// Age in seconds after which the speed table is reloaded.
    #[arg(long = ARG_MAX_AGE_SECS, value_name = "secs")]
    #[serde(default)]
    pub(crate) speed_table_max_age_secs: Option<u64>,
    /// Number of estimation worker threads.
    #[arg(long = ARG_WORKERS, value_name = "count")]
    #[serde(default)]
    pub(crate) workers: Option<usize>,
    /// Capacity of the work and result queues.
    #[arg(long = ARG_QUEUE_CAPACITY, value_name = "count")]
    #[serde(default)]
    pub(crate) queue_capacity: Option<usize>,
}

impl EstimateArgs {
    pub(crate) fn into_config(self) -> Result<EstimateConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        EstimateConfig::resolve(merged, &ambient_env)
    }

    fn engine_fields(&self) -> EngineFields {
        EngineFields {
            speed_table: self.speed_table.clone(),
            request_timeout_ms: self.request_timeout_ms,
            default_speed: self.default_speed,
            speed_table_max_age_secs: self.speed_table_max_age_secs,
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }
}

fn ambient_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Options shared by both subcommands before validation.
struct EngineFields {
    speed_table: Option<String>,
    request_timeout_ms: Option<u64>,
    default_speed: Option<f64>,
    speed_table_max_age_secs: Option<u64>,
    workers: Option<usize>,
    queue_capacity: Option<usize>,
}

/// Validated settings shared by `serve` and `estimate`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EngineSettings {
    pub(crate) speed_table: SpeedTableLocation,
    pub(crate) request_timeout: Duration,
    pub(crate) estimator: EstimatorConfig,
    pub(crate) cache: SpeedCacheConfig,
}

impl EngineSettings {
    fn resolve(
        fields: EngineFields,
        speed_table_env: &'static str,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, CliError> {
        let speed_table = resolve_speed_table(fields.speed_table, env).ok_or(
            CliError::MissingArgument {
                field: ARG_SPEED_TABLE,
                env: speed_table_env,
            },
        )?;
        let speed_table = SpeedTableLocation::parse(&speed_table)?;

        let request_timeout_ms = fields
            .request_timeout_ms
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        if request_timeout_ms == 0 {
            return Err(invalid(ARG_REQUEST_TIMEOUT_MS, request_timeout_ms, "must be positive"));
        }

        let default_speed = fields.default_speed.unwrap_or(DEFAULT_SPEED);
        if !default_speed.is_finite() || default_speed <= 0.0 {
            return Err(invalid(
                ARG_DEFAULT_SPEED,
                default_speed,
                "must be a positive number",
            ));
        }

        let queue_capacity = fields.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            return Err(invalid(ARG_QUEUE_CAPACITY, queue_capacity, "must be at least 1"));
        }

        let mut estimator = EstimatorConfig::default()
            .with_default_speed(default_speed)
            .with_queue_capacity(queue_capacity);
        if let Some(workers) = fields.workers {
            let workers = NonZeroUsize::new(workers)
                .ok_or_else(|| invalid(ARG_WORKERS, workers, "must be at least 1"))?;
            estimator = estimator.with_workers(workers);
        }

        let mut cache = SpeedCacheConfig::default();
        if let Some(secs) = fields.speed_table_max_age_secs {
            cache = cache.with_max_age(Duration::from_secs(secs));
        }

        Ok(Self {
            speed_table,
            request_timeout: Duration::from_millis(request_timeout_ms),
            estimator,
            cache,
        })
    }
}

/// Prefer the configured location, then fall back to the bucket and key
/// variables used by older deployments.
fn resolve_speed_table(
    configured: Option<String>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Option<String> {
    configured.filter(|value| !value.trim().is_empty()).or_else(|| {
        let bucket = env(LEGACY_BUCKET_ENV).filter(|value| !value.is_empty())?;
        let key = env(LEGACY_KEY_ENV).filter(|value| !value.is_empty())?;
        Some(format!("s3://{bucket}/{key}"))
    })
}

fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> CliError {
    CliError::InvalidArgument {
        field,
        value: value.to_string(),
        reason,
    }
}

/// Resolved `serve` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ServeConfig {
    pub(crate) engine: EngineSettings,
    pub(crate) listen: String,
    pub(crate) warm_start: bool,
    pub(crate) refresh_interval: Option<Duration>,
}

impl ServeConfig {
    pub(crate) fn resolve(
        args: ServeArgs,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, CliError> {
        let engine = EngineSettings::resolve(args.engine_fields(), ENV_SERVE_SPEED_TABLE, env)?;
        let refresh_interval = match args.refresh_interval_secs {
            Some(0) => {
                return Err(invalid(ARG_REFRESH_INTERVAL_SECS, 0, "must be positive"));
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };
        Ok(Self {
            engine,
            listen: args.listen.unwrap_or_else(|| DEFAULT_LISTEN.to_owned()),
            warm_start: args.warm_start.unwrap_or(false),
            refresh_interval,
        })
    }
}

/// Resolved `estimate` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EstimateConfig {
    pub(crate) engine: EngineSettings,
    pub(crate) request_path: Utf8PathBuf,
}

impl EstimateConfig {
    pub(crate) fn resolve(
        args: EstimateArgs,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, CliError> {
        let engine =
            EngineSettings::resolve(args.engine_fields(), ENV_ESTIMATE_SPEED_TABLE, env)?;
        let request_path = args.request_path.ok_or(CliError::MissingArgument {
            field: ARG_REQUEST,
            env: ENV_ESTIMATE_REQUEST,
        })?;
        Ok(Self {
            engine,
            request_path,
        })
    }
}

#[cfg(test)]
pub(crate) fn serve_config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ServeConfig, CliError> {
    let merged = ServeArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ServeConfig::resolve(merged, &|_| None)
}
