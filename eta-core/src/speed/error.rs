//! Error types produced by the speed table, its loaders and the cache.

use std::error::Error as StdError;

use thiserror::Error;

use crate::RegionId;

/// Errors returned by [`crate::SpeedTableBuilder::insert`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpeedTableError {
    /// The day of week was outside `0..=6`.
    #[error("day of week {day} is outside 0..=6")]
    DayOutOfRange {
        /// Offending day value.
        day: u32,
    },
    /// The minute of day was outside `0..=1440`.
    #[error("minute of day {minute} is outside 0..=1440")]
    MinuteOutOfRange {
        /// Offending minute value.
        minute: u32,
    },
    /// The speed was negative, NaN or infinite.
    #[error("speed {speed} must be a finite, non-negative number")]
    InvalidSpeed {
        /// Offending speed value.
        speed: f64,
    },
}

/// Errors returned by [`crate::SpeedTableLoader::load`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpeedTableLoadError {
    /// The raw speed data could not be retrieved.
    #[error("failed to fetch speed table: {source}")]
    Fetch {
        /// Transport or I/O failure reported by the source.
        source: Box<dyn StdError + Send + Sync>,
    },
    /// The raw speed data was retrieved but is malformed.
    #[error("failed to parse speed table: {source}")]
    Parse {
        /// Parse or validation failure.
        source: Box<dyn StdError + Send + Sync>,
    },
    /// The caller's deadline elapsed before the load finished.
    #[error("speed table load exceeded its deadline")]
    DeadlineExceeded,
    /// The caller cancelled the load.
    #[error("speed table load was cancelled")]
    Cancelled,
}

impl SpeedTableLoadError {
    /// Wrap a transport failure.
    pub fn fetch(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Fetch {
            source: source.into(),
        }
    }

    /// Wrap a parse failure.
    pub fn parse(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Parse {
            source: source.into(),
        }
    }
}

/// Errors returned by [`crate::RegionalSpeedCache::lookup_speed_with_context`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpeedLookupError {
    /// No breakpoint covers the requested region, day and minute.
    #[error("no speed for region {region} on day {day} at minute {minute}")]
    NotFound {
        /// Requested region.
        region: RegionId,
        /// Day of week, Sunday = 0.
        day: u32,
        /// Minute of day.
        minute: u32,
    },
    /// The table was stale and reloading it failed.
    #[error("failed to refresh speed table: {source}")]
    Refresh {
        /// Loader failure.
        source: SpeedTableLoadError,
    },
    /// The table was stale and the reload this caller waited on failed.
    #[error("speed table refresh failed while this lookup was waiting for it")]
    ConcurrentRefreshFailed,
}
