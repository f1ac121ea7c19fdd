//! Regional, time-of-week travel speeds.
//!
//! [`SpeedTable`] holds per-region, per-day step functions of speed over the
//! minutes of a day. [`RegionalSpeedCache`] owns the current table, refreshes
//! it through a [`SpeedTableLoader`] once it grows stale and answers
//! point-in-time queries for any number of concurrent readers.

mod cache;
mod clock;
mod error;
mod table;

pub use cache::{
    DEFAULT_MAX_AGE, RegionalSpeedCache, SpeedCacheConfig, SpeedLookup, SpeedTableLoader,
};
pub use clock::{Clock, SystemClock};
pub use error::{SpeedLookupError, SpeedTableError, SpeedTableLoadError};
pub use table::{DAYS_PER_WEEK, MAX_MINUTE_OF_DAY, SpeedTable, SpeedTableBuilder, TimeOfWeek};
