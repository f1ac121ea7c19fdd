//! Speed table sources and loaders for the dispatch ETA engine.
//!
//! Responsibilities:
//! - Fetch raw speed tables from object storage, HTTP or local files.
//! - Decode the CSV format into an [`eta_core::SpeedTable`].
//! - Implement [`eta_core::SpeedTableLoader`] on top of async sources.
//!
//! Boundaries:
//! - Do not encode estimation rules (live in `eta-core`).
//! - Keep blocking I/O off async executors; sources are async and the loader
//!   bridges them to the synchronous cache.
//!
//! Invariants:
//! - A malformed table never replaces a good one: decoding is all or nothing.
//! - No global mutable state.

mod loader;
mod parse;
pub mod source;

#[doc(hidden)]
pub mod test_support;

pub use loader::{LoaderBuildError, SourceSpeedTableLoader};
pub use parse::{SpeedTableParseError, parse_speed_table};
#[cfg(feature = "source-s3")]
pub use source::S3SpeedTableSource;
pub use source::{
    DEFAULT_USER_AGENT, DynSpeedTableSource, FileSpeedTableSource, HttpSpeedTableSource,
    HttpSpeedTableSourceConfig, LocationParseError, SourceError, SpeedTableLocation,
    SpeedTableSource,
};
