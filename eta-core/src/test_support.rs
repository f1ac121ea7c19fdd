//! Deterministic doubles for the speed seams, shared by unit, behaviour and
//! downstream crate tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};

use crate::{
    Clock, RegionId, RequestContext, SpeedLookup, SpeedLookupError, SpeedTable,
    SpeedTableLoadError, SpeedTableLoader, TimeOfWeek,
};

const SLEEP_SLICE: Duration = Duration::from_millis(1);

/// Table with region 1 on Tuesdays: 20 mph from 08:00 and 25 mph from 10:00.
pub fn sample_speed_table() -> SpeedTable {
    let mut builder = SpeedTable::builder();
    let inserted = builder
        .insert(1, 2, 480, 20.0)
        .and_then(|builder| builder.insert(1, 2, 600, 25.0));
    debug_assert!(inserted.is_ok(), "sample breakpoints are in range");
    builder.build()
}

/// [`SpeedLookup`] returning the same speed for every region and instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpeedLookup {
    speed: f64,
}

impl FixedSpeedLookup {
    /// Always answer `speed`.
    pub fn new(speed: f64) -> Self {
        Self { speed }
    }
}

impl SpeedLookup for FixedSpeedLookup {
    fn lookup_speed_with_context(
        &self,
        _ctx: &RequestContext,
        _region: RegionId,
        _at: &DateTime<FixedOffset>,
    ) -> Result<f64, SpeedLookupError> {
        Ok(self.speed)
    }
}

/// [`SpeedLookup`] that never finds a speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSpeedLookup;

impl SpeedLookup for FailingSpeedLookup {
    fn lookup_speed_with_context(
        &self,
        _ctx: &RequestContext,
        region: RegionId,
        at: &DateTime<FixedOffset>,
    ) -> Result<f64, SpeedLookupError> {
        let when = TimeOfWeek::from_datetime(at);
        Err(SpeedLookupError::NotFound {
            region,
            day: when.day,
            minute: when.minute,
        })
    }
}

/// [`SpeedLookup`] that blocks for a fixed delay before answering, ignoring
/// the context the way a stuck remote source would.
#[derive(Debug, Clone, Copy)]
pub struct SlowSpeedLookup {
    delay: Duration,
    speed: f64,
}

impl SlowSpeedLookup {
    /// Answer `speed` after sleeping for `delay`.
    pub fn new(delay: Duration, speed: f64) -> Self {
        Self { delay, speed }
    }
}

impl SpeedLookup for SlowSpeedLookup {
    fn lookup_speed_with_context(
        &self,
        _ctx: &RequestContext,
        _region: RegionId,
        _at: &DateTime<FixedOffset>,
    ) -> Result<f64, SpeedLookupError> {
        thread::sleep(self.delay);
        Ok(self.speed)
    }
}

/// [`SpeedTableLoader`] serving an in-memory table and counting loads.
///
/// Every call to [`SpeedTableLoader::load`] is counted, including failed
/// ones.
#[derive(Debug, Default)]
pub struct StubSpeedTableLoader {
    table: Mutex<SpeedTable>,
    failing: AtomicBool,
    delay: Duration,
    loads: AtomicUsize,
}

impl StubSpeedTableLoader {
    /// Serve `table`.
    pub fn new(table: SpeedTable) -> Self {
        Self {
            table: Mutex::new(table),
            ..Self::default()
        }
    }

    /// Serve [`sample_speed_table`].
    pub fn sample() -> Self {
        Self::new(sample_speed_table())
    }

    /// A loader whose every load fails.
    pub fn failing() -> Self {
        let loader = Self::default();
        loader.set_failing(true);
        loader
    }

    /// Sleep for `delay` on each load, honouring the context meanwhile.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Toggle failure of subsequent loads.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Replace the table served by subsequent loads.
    pub fn set_table(&self, table: SpeedTable) {
        *self.table.lock().unwrap_or_else(PoisonError::into_inner) = table;
    }

    /// Number of load attempts so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn wait(&self, ctx: &RequestContext) -> Result<(), SpeedTableLoadError> {
        let until = Instant::now() + self.delay;
        while Instant::now() < until {
            if ctx.is_cancelled() {
                return Err(SpeedTableLoadError::Cancelled);
            }
            if ctx.is_expired() {
                return Err(SpeedTableLoadError::DeadlineExceeded);
            }
            thread::sleep(SLEEP_SLICE);
        }
        Ok(())
    }
}

impl SpeedTableLoader for StubSpeedTableLoader {
    fn load(&self, ctx: &RequestContext) -> Result<SpeedTable, SpeedTableLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.wait(ctx)?;
        if self.failing.load(Ordering::SeqCst) {
            return Err(SpeedTableLoadError::fetch("stub loader configured to fail"));
        }
        Ok(self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// A clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
