//! Fan-out of pairs to a bounded worker pool and fan-in of their estimates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use geo::Coord;

use super::config::EstimatorConfig;
use super::error::EstimateError;
use crate::distance::haversine_miles;
use crate::request::{EstimateResult, EstimationRequest, TravelEstimate};
use crate::RequestContext;

struct Job {
    origin: String,
    destination: String,
    from: Coord<f64>,
    to: Coord<f64>,
}

struct Estimated {
    origin: String,
    destination: String,
    estimate: TravelEstimate,
}

/// Shared stop signals observed by the dispatcher.
#[derive(Clone)]
pub(super) struct StopSignal {
    pub(super) abandoned: Arc<AtomicBool>,
    pub(super) ctx: RequestContext,
}

impl StopSignal {
    pub(super) fn should_stop(&self) -> bool {
        self.abandoned.load(Ordering::Acquire) || self.ctx.is_done()
    }

    fn as_error(&self, started: Instant) -> EstimateError {
        if self.ctx.is_expired() {
            EstimateError::DeadlineExceeded {
                elapsed: started.elapsed(),
            }
        } else {
            EstimateError::Cancelled
        }
    }
}

/// Estimate every pair of `request` at `speed` and merge the results.
///
/// Returns an error rather than a partial map when the stop signal fires
/// before every pair was dispatched.
pub(super) fn fan_out(
    request: EstimationRequest,
    speed: f64,
    config: &EstimatorConfig,
    stop: &StopSignal,
    started: Instant,
) -> Result<EstimateResult, EstimateError> {
    let EstimationRequest {
        locations, pairs, ..
    } = request;
    let mut merged: EstimateResult = pairs
        .keys()
        .map(|origin| (origin.clone(), HashMap::new()))
        .collect();
    if pairs.values().all(Vec::is_empty) {
        return Ok(merged);
    }

    let capacity = config.effective_queue_capacity();
    let (work_tx, work_rx) = mpsc::sync_channel::<Job>(capacity);
    let (result_tx, result_rx) = mpsc::sync_channel::<Estimated>(capacity);
    let work_rx = Arc::new(Mutex::new(work_rx));

    for index in 0..config.worker_count() {
        let jobs = Arc::clone(&work_rx);
        let results = result_tx.clone();
        thread::Builder::new()
            .name(format!("eta-worker-{index}"))
            .spawn(move || work(&jobs, &results, speed))
            .map_err(|source| EstimateError::Spawn { source })?;
    }
    // Workers hold the only result senders now; their exit ends the merge.
    drop(result_tx);

    let dispatcher_stop = stop.clone();
    let dispatcher = thread::Builder::new()
        .name("eta-dispatcher".to_owned())
        .spawn(move || dispatch(pairs, &locations, &work_tx, &dispatcher_stop))
        .map_err(|source| EstimateError::Spawn { source })?;

    for Estimated {
        origin,
        destination,
        estimate,
    } in result_rx
    {
        if let Some(row) = merged.get_mut(&origin) {
            row.insert(destination, estimate);
        }
    }

    dispatch_outcome(dispatcher.join(), stop, started)?;
    Ok(merged)
}

/// Turn the dispatcher's exit into the request outcome.
fn dispatch_outcome(
    joined: thread::Result<bool>,
    stop: &StopSignal,
    started: Instant,
) -> Result<(), EstimateError> {
    match joined {
        Ok(true) if !stop.abandoned.load(Ordering::Acquire) => Ok(()),
        Ok(_) => Err(stop.as_error(started)),
        Err(_) => {
            log::error!("estimation dispatcher panicked");
            Err(EstimateError::Interrupted)
        }
    }
}

/// Feed every resolvable pair into the work queue.
///
/// Returns `false` when stopped early. Dropping `work_tx` on return closes
/// the queue so idle workers exit.
fn dispatch(
    pairs: HashMap<String, Vec<String>>,
    locations: &HashMap<String, Coord<f64>>,
    work_tx: &SyncSender<Job>,
    stop: &StopSignal,
) -> bool {
    for (origin, destinations) in pairs {
        if destinations.is_empty() {
            continue;
        }
        let Some(&from) = locations.get(&origin) else {
            log::debug!(
                "dropping {} pairs: origin {origin} has no location",
                destinations.len()
            );
            continue;
        };
        for destination in destinations {
            if stop.should_stop() {
                return false;
            }
            let Some(&to) = locations.get(&destination) else {
                log::debug!("dropping pair {origin} -> {destination}: destination has no location");
                continue;
            };
            let job = Job {
                origin: origin.clone(),
                destination,
                from,
                to,
            };
            if work_tx.send(job).is_err() {
                return false;
            }
        }
    }
    true
}

fn work(jobs: &Mutex<Receiver<Job>>, results: &SyncSender<Estimated>, speed: f64) {
    loop {
        // The guard is released before the job is processed.
        let next = jobs.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(job) = next else {
            return;
        };
        let distance = haversine_miles(job.from, job.to);
        let estimated = Estimated {
            origin: job.origin,
            destination: job.destination,
            estimate: TravelEstimate::rounded(distance, distance / speed),
        };
        if results.send(estimated).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rstest::{fixture, rstest};
    use std::num::NonZeroUsize;
    use std::time::Duration;

    #[fixture]
    fn stop() -> StopSignal {
        StopSignal {
            abandoned: Arc::new(AtomicBool::new(false)),
            ctx: RequestContext::background(),
        }
    }

    fn request() -> EstimationRequest {
        let at = DateTime::parse_from_rfc3339("2024-01-02T08:00:00Z").expect("timestamp");
        EstimationRequest::new(1, at)
            .with_location("A", Coord { x: 0.0, y: 0.0 })
            .with_location("B", Coord { x: 1.0, y: 0.0 })
            .with_location("C", Coord { x: 0.0, y: 1.0 })
            .with_pair("A", "B")
            .with_pair("A", "C")
            .with_pair("B", "A")
    }

    #[rstest]
    #[case(1, 1)]
    #[case(1, 4)]
    #[case(3, 2)]
    fn tiny_queues_do_not_deadlock(
        stop: StopSignal,
        #[case] capacity: usize,
        #[case] workers: usize,
    ) {
        let config = EstimatorConfig::default()
            .with_queue_capacity(capacity)
            .with_workers(NonZeroUsize::new(workers).expect("non-zero"));
        let merged =
            fan_out(request(), 10.0, &config, &stop, Instant::now()).expect("fan out succeeds");
        assert_eq!(merged.get("A").map(HashMap::len), Some(2));
        assert_eq!(merged.get("B").map(HashMap::len), Some(1));
    }

    #[rstest]
    fn abandoned_request_returns_no_partial_map(stop: StopSignal) {
        stop.abandoned.store(true, Ordering::Release);
        let err = fan_out(
            request(),
            10.0,
            &EstimatorConfig::default(),
            &stop,
            Instant::now(),
        )
        .expect_err("abandoned before dispatch");
        assert!(matches!(err, EstimateError::Cancelled));
    }

    #[rstest]
    fn panicked_dispatcher_is_reported_as_interrupted(stop: StopSignal) {
        let joined: thread::Result<bool> = Err(Box::new("dispatcher exploded"));
        let err = dispatch_outcome(joined, &stop, Instant::now()).expect_err("panic is an error");
        assert!(matches!(err, EstimateError::Interrupted));
    }

    #[rstest]
    fn expired_dispatch_is_reported_as_deadline() {
        let stop = StopSignal {
            abandoned: Arc::new(AtomicBool::new(false)),
            ctx: RequestContext::with_timeout(Duration::ZERO),
        };
        let err = dispatch_outcome(Ok(false), &stop, Instant::now()).expect_err("stopped early");
        assert!(matches!(err, EstimateError::DeadlineExceeded { .. }));
    }
}
