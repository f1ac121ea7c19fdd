//! Tuning knobs for [`super::HaversineEstimator`].

use std::num::NonZeroUsize;
use std::thread;

/// Speed substituted when no usable regional speed exists.
pub const DEFAULT_SPEED: f64 = 15.0;

/// Default bound of the work and result queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100_000;

/// Configuration for the estimation engine.
///
/// # Examples
/// ```
/// use std::num::NonZeroUsize;
/// use eta_core::EstimatorConfig;
///
/// let config = EstimatorConfig::default()
///     .with_default_speed(12.0)
///     .with_workers(NonZeroUsize::new(4).unwrap());
/// assert_eq!(config.worker_count(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    /// Speed used when the regional lookup fails or yields no usable value.
    pub default_speed: f64,
    /// Worker pool size; `None` means one per available core.
    pub workers: Option<NonZeroUsize>,
    /// Capacity of the bounded work and result queues.
    pub queue_capacity: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            default_speed: DEFAULT_SPEED,
            workers: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl EstimatorConfig {
    /// Override the fallback speed.
    #[must_use]
    pub fn with_default_speed(mut self, default_speed: f64) -> Self {
        self.default_speed = default_speed;
        self
    }

    /// Fix the worker pool size.
    #[must_use]
    pub fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Override the queue capacity. Zero is treated as one.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Resolved number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers
            .or_else(|| thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get)
    }

    pub(crate) fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_match_documented_constants() {
        let config = EstimatorConfig::default();
        assert_eq!(config.default_speed, DEFAULT_SPEED);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(config.worker_count() >= 1);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(64, 64)]
    fn queue_capacity_is_at_least_one(#[case] requested: usize, #[case] expected: usize) {
        let config = EstimatorConfig::default().with_queue_capacity(requested);
        assert_eq!(config.effective_queue_capacity(), expected);
    }
}
