//! Places a speed table can be fetched from.
//!
//! Every source yields the raw CSV bytes; decoding happens in
//! [`crate::parse_speed_table`] so all sources share one format.

mod file;
mod http;
mod location;
#[cfg(feature = "source-s3")]
mod s3;

use std::io;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use thiserror::Error;

pub use file::FileSpeedTableSource;
pub use http::{DEFAULT_USER_AGENT, HttpSpeedTableSource, HttpSpeedTableSourceConfig};
pub use location::{LocationParseError, SpeedTableLocation};
#[cfg(feature = "source-s3")]
pub use s3::S3SpeedTableSource;

/// Errors reported while retrieving raw speed table bytes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    /// A local file could not be opened or read.
    #[error("failed to read speed table file {path}: {source}")]
    File {
        /// Path that failed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// An HTTP request failed before a response arrived.
    #[error("request to {url} failed: {source}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The HTTP server answered with a non-success status.
    #[error("request to {url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Status code returned.
        status: u16,
    },
    /// Object storage rejected or failed the download.
    #[error("failed to download {location}: {message}")]
    ObjectStore {
        /// `s3://bucket/key` of the object.
        location: String,
        /// Rendered SDK error with its context chain.
        message: String,
    },
    /// The location names a source this build cannot reach.
    #[error("{location} requires the `{feature}` feature")]
    Unsupported {
        /// Location as written.
        location: String,
        /// Cargo feature that enables it.
        feature: &'static str,
    },
}

/// Asynchronous provider of raw speed table bytes.
#[async_trait(?Send)]
pub trait SpeedTableSource {
    /// Human readable location used in log lines.
    fn describe(&self) -> String;

    /// Fetch the complete table contents.
    async fn fetch(&self) -> Result<Vec<u8>, SourceError>;
}

#[async_trait(?Send)]
impl<S: SpeedTableSource + ?Sized> SpeedTableSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        (**self).fetch().await
    }
}

/// Type-erased source selected at runtime from a [`SpeedTableLocation`].
pub type DynSpeedTableSource = Box<dyn SpeedTableSource + Send + Sync>;
