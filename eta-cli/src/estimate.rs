//! `estimate` command: answer one request read from a file.

use std::io::{BufReader, Write};
use std::sync::Arc;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8};
use eta_core::{HaversineEstimator, RequestContext, SpeedLookup, TravelEstimator};

use crate::CliError;
use crate::config::{EstimateArgs, EstimateConfig};
use crate::serve::open_cache;
use crate::wire::{ComputeTravelEstimatesRequest, ComputedTravelEstimates};

pub(crate) fn run_estimate(args: EstimateArgs) -> Result<(), CliError> {
    let config = args.into_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(CliError::BuildRuntime)?;
    let cache = runtime.block_on(open_cache(&config.engine, runtime.handle().clone()))?;
    let mut stdout = std::io::stdout().lock();
    run_estimate_with(&config, Arc::new(cache), &mut stdout)
}

/// Estimate the request named by `config` against `speeds` and write the
/// pretty-printed response to `writer`.
pub(crate) fn run_estimate_with<S: SpeedLookup + 'static>(
    config: &EstimateConfig,
    speeds: Arc<S>,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let payload = load_estimate_request(&config.request_path)?;
    let request = payload
        .into_request()
        .map_err(|source| CliError::InvalidEstimateRequest {
            path: config.request_path.clone(),
            source,
        })?;
    let estimator = HaversineEstimator::with_config(speeds, config.engine.estimator);
    let ctx = RequestContext::with_timeout(config.engine.request_timeout);
    let travel_estimates = estimator
        .estimate(&ctx, request)
        .map_err(CliError::Estimate)?;
    write_estimate_response(writer, &ComputedTravelEstimates { travel_estimates })
}

/// Loads a JSON-encoded request from disk.
pub(crate) fn load_estimate_request(
    path: &Utf8Path,
) -> Result<ComputeTravelEstimatesRequest, CliError> {
    let file = fs_utf8::File::open_ambient(path, ambient_authority()).map_err(|source| {
        CliError::OpenEstimateRequest {
            path: path.to_path_buf(),
            source,
        }
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| {
        CliError::ParseEstimateRequest {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn write_estimate_response(
    writer: &mut dyn Write,
    response: &ComputedTravelEstimates,
) -> Result<(), CliError> {
    let payload =
        serde_json::to_string_pretty(response).map_err(CliError::SerializeEstimateResponse)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteEstimateOutput)?;
    writer
        .write_all(b"\n")
        .map_err(CliError::WriteEstimateOutput)?;
    Ok(())
}
