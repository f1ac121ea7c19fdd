//! Errors returned by [`super::TravelEstimator::estimate`].

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure of a whole estimate request.
///
/// Partial results are never returned alongside an error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EstimateError {
    /// The context deadline passed before every pair was merged.
    #[error("estimate exceeded its deadline after {elapsed:?}")]
    DeadlineExceeded {
        /// Time spent waiting before giving up.
        elapsed: Duration,
    },
    /// The context was cancelled.
    #[error("estimate was cancelled")]
    Cancelled,
    /// A coordinator, dispatcher or worker thread could not be started.
    #[error("failed to spawn estimation thread: {source}")]
    Spawn {
        /// Error reported by the operating system.
        #[source]
        source: io::Error,
    },
    /// The coordinator or dispatcher stopped without reporting a result.
    #[error("estimation thread exited without a result")]
    Interrupted,
}

impl EstimateError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeadlineExceeded { .. } | Self::Cancelled | Self::Interrupted
        )
    }
}
