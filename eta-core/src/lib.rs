//! Core domain types and the concurrent estimation engine for dispatch ETAs.
//!
//! The crate is synchronous and performs no I/O of its own. Speed data reaches
//! it through the [`SpeedTableLoader`] trait, which adapters in `eta-data`
//! implement, and callers drive estimates through [`TravelEstimator`].
//!
//! Invariants:
//! - No global mutable state; the speed cache is an explicit shared instance.
//! - Every blocking operation accepts a [`RequestContext`] and honours its
//!   deadline and cancellation flag.

#![forbid(unsafe_code)]

pub mod context;
pub mod distance;
pub mod engine;
pub mod request;
pub mod speed;

#[doc(hidden)]
pub mod test_support;

pub use context::RequestContext;
pub use distance::{EARTH_RADIUS_MILES, haversine_miles};
pub use engine::{
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SPEED, EstimateError, EstimatorConfig, HaversineEstimator,
    TravelEstimator,
};
pub use request::{EstimateResult, EstimationRequest, RegionId, TravelEstimate};
pub use speed::{
    Clock, DEFAULT_MAX_AGE, RegionalSpeedCache, SpeedCacheConfig, SpeedLookup, SpeedLookupError,
    SpeedTable, SpeedTableBuilder, SpeedTableError, SpeedTableLoadError, SpeedTableLoader,
    SystemClock, TimeOfWeek,
};
