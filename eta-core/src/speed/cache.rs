//! Lazily refreshed, concurrently readable cache of the current speed table.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset};

use super::clock::{Clock, SystemClock};
use super::error::{SpeedLookupError, SpeedTableLoadError};
use super::table::{SpeedTable, TimeOfWeek};
use crate::{RegionId, RequestContext};

/// Default maximum age of a cached table before it must be reloaded.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Fetch a complete speed table from wherever it lives.
///
/// Implementors must honour the context's deadline and cancellation flag and
/// return [`SpeedTableLoadError::DeadlineExceeded`] or
/// [`SpeedTableLoadError::Cancelled`] accordingly.
pub trait SpeedTableLoader: Send + Sync {
    /// Load a fresh table.
    ///
    /// # Errors
    ///
    /// Returns [`SpeedTableLoadError`] when the data cannot be fetched or
    /// parsed, or when the context ends first.
    fn load(&self, ctx: &RequestContext) -> Result<SpeedTable, SpeedTableLoadError>;
}

impl<L: SpeedTableLoader + ?Sized> SpeedTableLoader for Arc<L> {
    fn load(&self, ctx: &RequestContext) -> Result<SpeedTable, SpeedTableLoadError> {
        (**self).load(ctx)
    }
}

/// Resolve the speed in effect for a region at an instant.
///
/// This is the seam the estimation engine depends on.
pub trait SpeedLookup: Send + Sync {
    /// Return the speed for `region` at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`SpeedLookupError::NotFound`] when no breakpoint covers the
    /// instant and [`SpeedLookupError::Refresh`] when a required reload fails.
    fn lookup_speed_with_context(
        &self,
        ctx: &RequestContext,
        region: RegionId,
        at: &DateTime<FixedOffset>,
    ) -> Result<f64, SpeedLookupError>;
}

impl<S: SpeedLookup + ?Sized> SpeedLookup for Arc<S> {
    fn lookup_speed_with_context(
        &self,
        ctx: &RequestContext,
        region: RegionId,
        at: &DateTime<FixedOffset>,
    ) -> Result<f64, SpeedLookupError> {
        (**self).lookup_speed_with_context(ctx, region, at)
    }
}

/// Tuning for [`RegionalSpeedCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedCacheConfig {
    /// Age after which the cached table is reloaded on the next lookup.
    pub max_age: Duration,
}

impl Default for SpeedCacheConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl SpeedCacheConfig {
    /// Override the staleness window.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

#[derive(Debug, Clone)]
struct LoadedTable {
    table: Arc<SpeedTable>,
    loaded_at: Instant,
}

/// Shared cache over a [`SpeedTableLoader`].
///
/// The table is loaded on first use and reloaded once it is older than
/// [`SpeedCacheConfig::max_age`]. Concurrent callers that all observe a stale
/// table trigger a single load; the rest wait for it and then read the new
/// table. A failed load leaves the previous table in place, and callers that
/// were already waiting on it share its failure instead of loading again.
///
/// # Examples
/// ```
/// use chrono::DateTime;
/// use eta_core::{RegionalSpeedCache, test_support::StubSpeedTableLoader};
///
/// let cache = RegionalSpeedCache::new(StubSpeedTableLoader::sample());
/// let at = DateTime::parse_from_rfc3339("2024-01-02T08:20:00Z").unwrap();
/// assert_eq!(cache.lookup_speed(1, &at), Some(20.0));
/// ```
pub struct RegionalSpeedCache<L, C = SystemClock> {
    loader: L,
    clock: C,
    config: SpeedCacheConfig,
    state: RwLock<Option<LoadedTable>>,
    refresh_guard: Mutex<()>,
    failed_loads: AtomicU64,
}

impl<L: SpeedTableLoader> RegionalSpeedCache<L> {
    /// Create an empty cache with the default staleness window.
    pub fn new(loader: L) -> Self {
        Self::with_config(loader, SpeedCacheConfig::default())
    }

    /// Create an empty cache with an explicit configuration.
    pub fn with_config(loader: L, config: SpeedCacheConfig) -> Self {
        Self::with_clock(loader, config, SystemClock)
    }
}

impl<L: SpeedTableLoader, C: Clock> RegionalSpeedCache<L, C> {
    /// Create an empty cache reading time from `clock`.
    pub fn with_clock(loader: L, config: SpeedCacheConfig, clock: C) -> Self {
        Self {
            loader,
            clock,
            config,
            state: RwLock::new(None),
            refresh_guard: Mutex::new(()),
            failed_loads: AtomicU64::new(0),
        }
    }

    /// Look up a speed without a deadline, logging and hiding refresh errors.
    pub fn lookup_speed(&self, region: RegionId, at: &DateTime<FixedOffset>) -> Option<f64> {
        match self.lookup_speed_with_context(&RequestContext::background(), region, at) {
            Ok(speed) => Some(speed),
            Err(SpeedLookupError::NotFound { .. }) => None,
            Err(err) => {
                log::warn!("speed lookup for region {region} failed: {err}");
                None
            }
        }
    }

    /// Look up a speed, reloading the table first when it is stale.
    ///
    /// # Errors
    ///
    /// See [`SpeedLookup::lookup_speed_with_context`].
    pub fn lookup_speed_with_context(
        &self,
        ctx: &RequestContext,
        region: RegionId,
        at: &DateTime<FixedOffset>,
    ) -> Result<f64, SpeedLookupError> {
        if self.is_stale() {
            self.refresh_if_stale(ctx)?;
        }
        let when = TimeOfWeek::from_datetime(at);
        let table = self.current_table();
        table
            .and_then(|table| table.speed_at(region, when))
            .ok_or(SpeedLookupError::NotFound {
                region,
                day: when.day,
                minute: when.minute,
            })
    }

    /// Reload the table unconditionally.
    ///
    /// Concurrent calls are serialised behind the same guard used by
    /// staleness-driven reloads.
    ///
    /// # Errors
    ///
    /// Returns [`SpeedLookupError::Refresh`] when the loader fails; the
    /// previous table is kept.
    pub fn refresh(&self, ctx: &RequestContext) -> Result<(), SpeedLookupError> {
        let _guard = self
            .refresh_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.load_and_swap(ctx)
    }

    /// Instant of the last successful load.
    pub fn last_loaded_at(&self) -> Option<Instant> {
        self.read_state().as_ref().map(|loaded| loaded.loaded_at)
    }

    /// Whether a table has ever been loaded successfully.
    pub fn is_loaded(&self) -> bool {
        self.read_state().is_some()
    }

    /// Shared handle to the table currently being served.
    pub fn snapshot(&self) -> Option<Arc<SpeedTable>> {
        self.current_table()
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> SpeedCacheConfig {
        self.config
    }

    fn refresh_if_stale(&self, ctx: &RequestContext) -> Result<(), SpeedLookupError> {
        let failures_before = self.failed_loads.load(Ordering::Acquire);
        let _guard = self
            .refresh_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Another caller may have refreshed while we waited for the guard.
        if !self.is_stale() {
            return Ok(());
        }
        if self.failed_loads.load(Ordering::Acquire) != failures_before {
            return Err(SpeedLookupError::ConcurrentRefreshFailed);
        }
        self.load_and_swap(ctx)
    }

    // Callers must hold `refresh_guard`.
    fn load_and_swap(&self, ctx: &RequestContext) -> Result<(), SpeedLookupError> {
        match self.loader.load(ctx) {
            Ok(table) => {
                log::info!(
                    "loaded speed table with {} regions and {} breakpoints",
                    table.region_count(),
                    table.breakpoint_count()
                );
                let loaded = LoadedTable {
                    table: Arc::new(table),
                    loaded_at: self.clock.now(),
                };
                *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(loaded);
                Ok(())
            }
            Err(source) => {
                log::warn!("speed table refresh failed: {source}");
                // Waiters with their own deadline still get to try.
                if !matches!(
                    source,
                    SpeedTableLoadError::DeadlineExceeded | SpeedTableLoadError::Cancelled
                ) {
                    self.failed_loads.fetch_add(1, Ordering::Release);
                }
                Err(SpeedLookupError::Refresh { source })
            }
        }
    }

    fn is_stale(&self) -> bool {
        let now = self.clock.now();
        match self.read_state().as_ref() {
            None => true,
            Some(loaded) => now.saturating_duration_since(loaded.loaded_at) > self.config.max_age,
        }
    }

    fn current_table(&self) -> Option<Arc<SpeedTable>> {
        self.read_state()
            .as_ref()
            .map(|loaded| Arc::clone(&loaded.table))
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, Option<LoadedTable>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<L: SpeedTableLoader, C: Clock> SpeedLookup for RegionalSpeedCache<L, C> {
    fn lookup_speed_with_context(
        &self,
        ctx: &RequestContext,
        region: RegionId,
        at: &DateTime<FixedOffset>,
    ) -> Result<f64, SpeedLookupError> {
        RegionalSpeedCache::lookup_speed_with_context(self, ctx, region, at)
    }
}

impl<L, C> fmt::Debug for RegionalSpeedCache<L, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded_at = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|loaded| loaded.loaded_at);
        f.debug_struct("RegionalSpeedCache")
            .field("config", &self.config)
            .field("loaded_at", &loaded_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualClock, StubSpeedTableLoader};
    use rstest::{fixture, rstest};
    use std::sync::Barrier;
    use std::thread;

    type TestCache = RegionalSpeedCache<Arc<StubSpeedTableLoader>, Arc<ManualClock>>;

    #[fixture]
    fn loader() -> Arc<StubSpeedTableLoader> {
        Arc::new(StubSpeedTableLoader::sample())
    }

    #[fixture]
    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new())
    }

    fn cache(loader: &Arc<StubSpeedTableLoader>, clock: &Arc<ManualClock>) -> TestCache {
        RegionalSpeedCache::with_clock(
            Arc::clone(loader),
            SpeedCacheConfig::default().with_max_age(Duration::from_secs(60)),
            Arc::clone(clock),
        )
    }

    fn tuesday(time: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(&format!("2024-01-02T{time}Z")).expect("valid timestamp")
    }

    #[rstest]
    #[case("08:20:00", Some(20.0))]
    #[case("11:40:00", Some(25.0))]
    #[case("01:40:00", None)]
    fn answers_from_the_loaded_table(
        loader: Arc<StubSpeedTableLoader>,
        clock: Arc<ManualClock>,
        #[case] time: &str,
        #[case] expected: Option<f64>,
    ) {
        let cache = cache(&loader, &clock);
        assert!(!cache.is_loaded());
        assert_eq!(cache.lookup_speed(1, &tuesday(time)), expected);
        assert!(cache.is_loaded());
    }

    #[rstest]
    fn missing_breakpoint_reports_day_and_minute(
        loader: Arc<StubSpeedTableLoader>,
        clock: Arc<ManualClock>,
    ) {
        let cache = cache(&loader, &clock);
        let err = cache
            .lookup_speed_with_context(&RequestContext::background(), 1, &tuesday("01:40:00"))
            .expect_err("no breakpoint before 08:00");
        match err {
            SpeedLookupError::NotFound {
                region,
                day,
                minute,
            } => assert_eq!((region, day, minute), (1, 2, 100)),
            other => panic!("expected NotFound, found {other:?}"),
        }
    }

    #[rstest]
    fn does_not_reload_within_window(loader: Arc<StubSpeedTableLoader>, clock: Arc<ManualClock>) {
        let cache = cache(&loader, &clock);
        let at = tuesday("08:20:00");
        cache.lookup_speed(1, &at);
        clock.advance(Duration::from_secs(59));
        cache.lookup_speed(1, &at);
        assert_eq!(loader.load_count(), 1);
    }

    #[rstest]
    fn reloads_once_after_window(loader: Arc<StubSpeedTableLoader>, clock: Arc<ManualClock>) {
        let cache = cache(&loader, &clock);
        let at = tuesday("08:20:00");
        cache.lookup_speed(1, &at);
        let first = cache.last_loaded_at().expect("loaded");
        clock.advance(Duration::from_secs(61));
        cache.lookup_speed(1, &at);
        cache.lookup_speed(1, &at);
        assert_eq!(loader.load_count(), 2);
        assert!(cache.last_loaded_at().expect("loaded") > first);
    }

    #[rstest]
    fn concurrent_stale_callers_collapse_into_one_load(clock: Arc<ManualClock>) {
        let loader = Arc::new(
            StubSpeedTableLoader::sample().with_delay(Duration::from_millis(50)),
        );
        let cache = Arc::new(cache(&loader, &clock));
        let callers = 8;
        let barrier = Arc::new(Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.lookup_speed(1, &tuesday("08:20:00"))
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().expect("caller thread"), Some(20.0));
        }
        assert_eq!(loader.load_count(), 1);
    }

    fn lookup_concurrently(
        cache: &Arc<TestCache>,
        callers: usize,
    ) -> Vec<Result<f64, SpeedLookupError>> {
        let barrier = Arc::new(Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let cache = Arc::clone(cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.lookup_speed_with_context(
                        &RequestContext::background(),
                        1,
                        &tuesday("08:20:00"),
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("caller thread"))
            .collect()
    }

    #[rstest]
    fn concurrent_callers_after_window_reload_once(clock: Arc<ManualClock>) {
        let loader = Arc::new(
            StubSpeedTableLoader::sample().with_delay(Duration::from_millis(100)),
        );
        let cache = Arc::new(cache(&loader, &clock));
        assert_eq!(cache.lookup_speed(1, &tuesday("08:20:00")), Some(20.0));
        let first = cache.last_loaded_at().expect("loaded");

        clock.advance(Duration::from_secs(31 * 60));
        let speeds = lookup_concurrently(&cache, 8);

        assert!(
            speeds.iter().all(|speed| matches!(speed, Ok(s) if (*s - 20.0).abs() < f64::EPSILON)),
            "{speeds:?}"
        );
        assert_eq!(loader.load_count(), 2);
        assert!(cache.last_loaded_at().expect("loaded") > first);
    }

    #[rstest]
    fn waiters_share_a_failed_reload(clock: Arc<ManualClock>) {
        let loader = Arc::new(
            StubSpeedTableLoader::sample().with_delay(Duration::from_millis(100)),
        );
        let cache = Arc::new(cache(&loader, &clock));
        assert_eq!(cache.lookup_speed(1, &tuesday("08:20:00")), Some(20.0));

        loader.set_failing(true);
        clock.advance(Duration::from_secs(61));
        let outcomes = lookup_concurrently(&cache, 8);

        let loaded_and_failed = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Err(SpeedLookupError::Refresh { .. })))
            .count();
        let shared = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Err(SpeedLookupError::ConcurrentRefreshFailed)))
            .count();
        assert_eq!((loaded_and_failed, shared), (1, 7), "{outcomes:?}");
        assert_eq!(loader.load_count(), 2);
        assert!(cache.is_loaded());
    }

    #[rstest]
    fn failed_reload_is_counted(clock: Arc<ManualClock>) {
        let loader = Arc::new(StubSpeedTableLoader::failing());
        let cache = cache(&loader, &clock);
        let before = cache.failed_loads.load(Ordering::Acquire);
        cache
            .refresh(&RequestContext::background())
            .expect_err("loader fails");
        assert_eq!(cache.failed_loads.load(Ordering::Acquire), before + 1);
    }

    #[rstest]
    fn timed_out_reload_does_not_fail_waiters(clock: Arc<ManualClock>) {
        let loader = Arc::new(
            StubSpeedTableLoader::sample().with_delay(Duration::from_millis(50)),
        );
        let cache = cache(&loader, &clock);
        let err = cache
            .refresh(&RequestContext::with_timeout(Duration::from_millis(5)))
            .expect_err("deadline passes during load");
        assert!(matches!(
            err,
            SpeedLookupError::Refresh {
                source: SpeedTableLoadError::DeadlineExceeded
            }
        ));
        assert_eq!(cache.failed_loads.load(Ordering::Acquire), 0);
        assert_eq!(cache.lookup_speed(1, &tuesday("08:20:00")), Some(20.0));
    }

    #[rstest]
    fn failed_refresh_keeps_previous_table(
        loader: Arc<StubSpeedTableLoader>,
        clock: Arc<ManualClock>,
    ) {
        let cache = cache(&loader, &clock);
        let at = tuesday("08:20:00");
        assert_eq!(cache.lookup_speed(1, &at), Some(20.0));

        loader.set_failing(true);
        clock.advance(Duration::from_secs(61));
        let err = cache
            .lookup_speed_with_context(&RequestContext::background(), 1, &at)
            .expect_err("refresh should fail");
        assert!(matches!(err, SpeedLookupError::Refresh { .. }));
        assert!(cache.snapshot().is_some_and(|table| !table.is_empty()));

        loader.set_failing(false);
        assert_eq!(cache.lookup_speed(1, &at), Some(20.0));
        assert_eq!(loader.load_count(), 3);
    }

    #[rstest]
    fn first_load_failure_leaves_cache_empty(clock: Arc<ManualClock>) {
        let loader = Arc::new(StubSpeedTableLoader::failing());
        let cache = cache(&loader, &clock);
        assert_eq!(cache.lookup_speed(1, &tuesday("08:20:00")), None);
        assert!(!cache.is_loaded());
        assert!(cache.last_loaded_at().is_none());
    }

    #[rstest]
    fn forced_refresh_reloads_a_fresh_table(
        loader: Arc<StubSpeedTableLoader>,
        clock: Arc<ManualClock>,
    ) {
        let cache = cache(&loader, &clock);
        cache
            .refresh(&RequestContext::background())
            .expect("refresh succeeds");
        cache
            .refresh(&RequestContext::background())
            .expect("refresh succeeds");
        assert_eq!(loader.load_count(), 2);
    }
}
