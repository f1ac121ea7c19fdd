//! HTTP adapter for the estimation engine.

use std::sync::Arc;
use std::time::Duration;

use eta_core::{
    EstimateError, HaversineEstimator, RegionalSpeedCache, RequestContext, TravelEstimator,
};
use eta_data::{DynSpeedTableSource, HttpSpeedTableSourceConfig, SourceSpeedTableLoader};
use poem::http::StatusCode;
use poem::listener::TcpListener;
use poem::web::{Data, Json};
use poem::{EndpointExt, IntoResponse, Response, Route, Server, get, handler, post};
use tokio::runtime::Handle;

use crate::CliError;
use crate::config::{EngineSettings, ServeConfig};
use crate::wire::{ComputeTravelEstimatesRequest, ComputedTravelEstimates, ErrorBody};

pub(crate) const ESTIMATE_PATH: &str = "/compute_travel_estimates";
pub(crate) const HEALTH_PATH: &str = "/healthz";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub(crate) type SpeedCache = RegionalSpeedCache<SourceSpeedTableLoader<DynSpeedTableSource>>;

/// Shared state handed to every request.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) estimator: Arc<dyn TravelEstimator>,
    pub(crate) request_timeout: Duration,
}

/// Failure of one HTTP request, rendered as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("error unmarshaling request: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid request: {0}")]
    Invalid(#[source] crate::wire::RequestValidationError),
    #[error("{0}")]
    Estimate(#[source] EstimateError),
    #[error("estimation task failed: {0}")]
    Task(#[source] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::Estimate(EstimateError::DeadlineExceeded { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Estimate(EstimateError::Cancelled | EstimateError::Interrupted) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Estimate(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "estimate request failed");
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

/// Cancels the request context when the handler future is dropped, which
/// happens when the client disconnects before the estimate completes.
struct CancelOnDrop(RequestContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[handler]
async fn compute_travel_estimates(state: Data<&AppState>, body: Vec<u8>) -> Response {
    match estimate_body(&state, &body).await {
        Ok(estimates) => Json(estimates).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn estimate_body(
    state: &AppState,
    body: &[u8],
) -> Result<ComputedTravelEstimates, ApiError> {
    let payload: ComputeTravelEstimatesRequest =
        serde_json::from_slice(body).map_err(ApiError::Decode)?;
    let request = payload.into_request().map_err(ApiError::Invalid)?;

    let ctx = RequestContext::with_timeout(state.request_timeout);
    let _cancel = CancelOnDrop(ctx.clone());
    let estimator = Arc::clone(&state.estimator);
    let travel_estimates = tokio::task::spawn_blocking(move || estimator.estimate(&ctx, request))
        .await
        .map_err(ApiError::Task)?
        .map_err(ApiError::Estimate)?;
    Ok(ComputedTravelEstimates { travel_estimates })
}

#[handler]
async fn healthz() -> &'static str {
    "ok"
}

/// Build the routes served by `eta serve`.
pub(crate) fn app(state: AppState) -> impl poem::Endpoint {
    Route::new()
        .at(ESTIMATE_PATH, post(compute_travel_estimates))
        .at(HEALTH_PATH, get(healthz))
        .data(state)
}

/// Open the configured source and wrap it in a speed cache whose loads run
/// on `handle`.
pub(crate) async fn open_cache(
    settings: &EngineSettings,
    handle: Handle,
) -> Result<SpeedCache, CliError> {
    let source = settings
        .speed_table
        .open(&HttpSpeedTableSourceConfig::default())
        .await
        .map_err(|source| CliError::OpenSpeedTable {
            location: settings.speed_table.to_string(),
            source,
        })?;
    let loader = SourceSpeedTableLoader::with_handle(source, handle);
    Ok(RegionalSpeedCache::with_config(loader, settings.cache))
}

async fn warm(cache: Arc<SpeedCache>) {
    let outcome =
        tokio::task::spawn_blocking(move || cache.refresh(&RequestContext::background())).await;
    match outcome {
        Ok(Ok(())) => tracing::info!("speed table loaded before accepting traffic"),
        Ok(Err(err)) => tracing::warn!(error = %err, "warm start failed; loading lazily"),
        Err(err) => tracing::warn!(error = %err, "warm start task failed; loading lazily"),
    }
}

fn spawn_periodic_refresh(cache: Arc<SpeedCache>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let cache = Arc::clone(&cache);
            let outcome =
                tokio::task::spawn_blocking(move || cache.refresh(&RequestContext::background()))
                    .await;
            match outcome {
                Ok(Ok(())) => tracing::debug!("periodic speed table refresh completed"),
                Ok(Err(err)) => tracing::warn!(error = %err, "periodic speed table refresh failed"),
                Err(err) => tracing::warn!(error = %err, "periodic refresh task failed"),
            }
        }
    });
}

pub(crate) async fn serve(config: ServeConfig) -> Result<(), CliError> {
    let cache = Arc::new(open_cache(&config.engine, Handle::current()).await?);
    if config.warm_start {
        warm(Arc::clone(&cache)).await;
    }
    if let Some(period) = config.refresh_interval {
        spawn_periodic_refresh(Arc::clone(&cache), period);
    }

    let estimator = HaversineEstimator::with_config(cache, config.engine.estimator);
    let state = AppState {
        estimator: Arc::new(estimator),
        request_timeout: config.engine.request_timeout,
    };

    tracing::info!(
        listen = %config.listen,
        speed_table = %config.engine.speed_table,
        "serving travel estimates"
    );
    Server::new(TcpListener::bind(config.listen.clone()))
        .run_with_graceful_shutdown(
            app(state),
            async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %err, "failed to listen for shutdown signal");
                }
            },
            Some(SHUTDOWN_GRACE),
        )
        .await
        .map_err(|source| CliError::Serve {
            listen: config.listen,
            source,
        })
}
