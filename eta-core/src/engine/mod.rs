//! Concurrent pairwise travel estimation.
//!
//! A request is handled by a coordinator thread that resolves one regional
//! speed, fans every (origin, destination) pair out to a bounded worker pool
//! and merges the results per origin. The calling thread races the merged
//! result against the request context; whichever finishes first decides the
//! outcome.

mod config;
mod error;
mod pool;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub use config::{DEFAULT_QUEUE_CAPACITY, DEFAULT_SPEED, EstimatorConfig};
pub use error::EstimateError;

use crate::request::{EstimateResult, EstimationRequest};
use crate::speed::SpeedLookup;
use crate::RequestContext;
use pool::StopSignal;

// Upper bound on how long a cancellation can go unnoticed by the caller.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Compute distance and time estimates for every requested pair.
pub trait TravelEstimator: Send + Sync {
    /// Estimate all pairs of `request` within the bounds of `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`EstimateError::DeadlineExceeded`] or
    /// [`EstimateError::Cancelled`] when `ctx` ends first; no partial result
    /// is returned in that case.
    fn estimate(
        &self,
        ctx: &RequestContext,
        request: EstimationRequest,
    ) -> Result<EstimateResult, EstimateError>;
}

impl<E: TravelEstimator + ?Sized> TravelEstimator for Arc<E> {
    fn estimate(
        &self,
        ctx: &RequestContext,
        request: EstimationRequest,
    ) -> Result<EstimateResult, EstimateError> {
        (**self).estimate(ctx, request)
    }
}

/// [`TravelEstimator`] using great-circle distance and a single regional
/// speed per request.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use chrono::DateTime;
/// use geo::Coord;
/// use eta_core::{
///     EstimationRequest, HaversineEstimator, RequestContext, TravelEstimator,
///     test_support::FixedSpeedLookup,
/// };
///
/// let estimator = HaversineEstimator::new(Arc::new(FixedSpeedLookup::new(10.0)));
/// let at = DateTime::parse_from_rfc3339("2024-01-02T08:00:00Z").unwrap();
/// let request = EstimationRequest::new(1, at)
///     .with_location("A", Coord { x: 0.0, y: 0.0 })
///     .with_location("B", Coord { x: 1.0, y: 0.0 })
///     .with_pair("A", "B");
///
/// let result = estimator.estimate(&RequestContext::background(), request).unwrap();
/// let estimate = result["A"]["B"];
/// assert_eq!((estimate.distance, estimate.time), (69.09, 6.91));
/// ```
#[derive(Debug)]
pub struct HaversineEstimator<S> {
    speeds: Arc<S>,
    config: EstimatorConfig,
}

impl<S: SpeedLookup + 'static> HaversineEstimator<S> {
    /// Create an estimator with the default configuration.
    pub fn new(speeds: Arc<S>) -> Self {
        Self::with_config(speeds, EstimatorConfig::default())
    }

    /// Create an estimator with an explicit configuration.
    pub fn with_config(speeds: Arc<S>, config: EstimatorConfig) -> Self {
        Self { speeds, config }
    }

    /// The speed source shared with other holders.
    pub fn speeds(&self) -> &Arc<S> {
        &self.speeds
    }

    /// The active configuration.
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }
}

impl<S: SpeedLookup + 'static> TravelEstimator for HaversineEstimator<S> {
    fn estimate(
        &self,
        ctx: &RequestContext,
        request: EstimationRequest,
    ) -> Result<EstimateResult, EstimateError> {
        let started = Instant::now();
        if ctx.is_cancelled() {
            return Err(EstimateError::Cancelled);
        }
        if ctx.is_expired() {
            return Err(EstimateError::DeadlineExceeded {
                elapsed: started.elapsed(),
            });
        }

        let stop = StopSignal {
            abandoned: Arc::new(AtomicBool::new(false)),
            ctx: ctx.clone(),
        };
        let coordinator = Coordinator {
            speeds: Arc::clone(&self.speeds),
            config: self.config,
            stop: stop.clone(),
            started,
        };
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("eta-coordinator".to_owned())
            .spawn(move || {
                let outcome = coordinator.run(request);
                if done_tx.send(outcome).is_err() {
                    log::debug!("estimate finished after its caller gave up");
                }
            })
            .map_err(|source| EstimateError::Spawn { source })?;

        let outcome = await_outcome(&done_rx, ctx, started);
        if outcome.is_err() {
            stop.abandoned.store(true, Ordering::Release);
        }
        outcome
    }
}

struct Coordinator<S> {
    speeds: Arc<S>,
    config: EstimatorConfig,
    stop: StopSignal,
    started: Instant,
}

impl<S: SpeedLookup> Coordinator<S> {
    fn run(self, request: EstimationRequest) -> Result<EstimateResult, EstimateError> {
        let speed = self.resolve_speed(&request);
        if self.stop.should_stop() {
            return Err(if self.stop.ctx.is_expired() {
                EstimateError::DeadlineExceeded {
                    elapsed: self.started.elapsed(),
                }
            } else {
                EstimateError::Cancelled
            });
        }
        pool::fan_out(request, speed, &self.config, &self.stop, self.started)
    }

    fn resolve_speed(&self, request: &EstimationRequest) -> f64 {
        let region = request.region;
        let fallback = self.config.default_speed;
        match self
            .speeds
            .lookup_speed_with_context(&self.stop.ctx, region, &request.dispatch_time)
        {
            Ok(speed) if speed.is_finite() && speed > 0.0 => speed,
            Ok(speed) => {
                log::warn!(
                    "region {region} has unusable speed {speed}; using default speed {fallback}"
                );
                fallback
            }
            Err(err) => {
                log::warn!("speed lookup for region {region} failed ({err}); using default speed {fallback}");
                fallback
            }
        }
    }
}

fn await_outcome(
    done_rx: &Receiver<Result<EstimateResult, EstimateError>>,
    ctx: &RequestContext,
    started: Instant,
) -> Result<EstimateResult, EstimateError> {
    loop {
        if ctx.is_cancelled() {
            return Err(EstimateError::Cancelled);
        }
        let wait = match ctx.remaining() {
            Some(remaining) if remaining.is_zero() => {
                return Err(EstimateError::DeadlineExceeded {
                    elapsed: started.elapsed(),
                });
            }
            Some(remaining) => remaining.min(CANCEL_POLL_INTERVAL),
            None => CANCEL_POLL_INTERVAL,
        };
        match done_rx.recv_timeout(wait) {
            Ok(outcome) => return outcome,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Err(EstimateError::Interrupted),
        }
    }
}
