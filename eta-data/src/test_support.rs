//! Shared fixtures for speed table source tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::source::{SourceError, SpeedTableSource};

/// Stub [`SpeedTableSource`] backed by in-memory bytes.
#[derive(Debug, Default)]
pub struct StubSpeedTableSource {
    bytes: Option<Vec<u8>>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl StubSpeedTableSource {
    /// Serve `bytes` on every fetch.
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Some(bytes.into()),
            ..Self::default()
        }
    }

    /// Fail every fetch with a status error.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Wait for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait(?Send)]
impl SpeedTableSource for StubSpeedTableSource {
    fn describe(&self) -> String {
        "stub://speed-table".to_owned()
    }

    async fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.bytes.clone().ok_or_else(|| SourceError::Status {
            url: self.describe(),
            status: 503,
        })
    }
}
