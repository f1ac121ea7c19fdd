//! Facade crate for the dispatch travel estimate engine.
//!
//! This crate re-exports the core estimation types and exposes the speed
//! table sources and loaders behind the `data` feature.

#![forbid(unsafe_code)]

pub use eta_core::{
    Clock, EstimateError, EstimateResult, EstimationRequest, EstimatorConfig, HaversineEstimator,
    RegionId, RegionalSpeedCache, RequestContext, SpeedCacheConfig, SpeedLookup, SpeedLookupError,
    SpeedTable, SpeedTableBuilder, SpeedTableError, SpeedTableLoadError, SpeedTableLoader,
    SystemClock, TimeOfWeek, TravelEstimate, TravelEstimator, haversine_miles,
};

#[cfg(feature = "data")]
pub use eta_data::{
    DynSpeedTableSource, FileSpeedTableSource, HttpSpeedTableSource, SourceError,
    SourceSpeedTableLoader, SpeedTableLocation, SpeedTableParseError, SpeedTableSource,
    parse_speed_table,
};

#[cfg(feature = "source-s3")]
pub use eta_data::S3SpeedTableSource;
