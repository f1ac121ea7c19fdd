//! Parsing of speed table locations and opening the matching source.

use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use thiserror::Error;
use url::Url;

use super::{
    DynSpeedTableSource, FileSpeedTableSource, HttpSpeedTableSource, HttpSpeedTableSourceConfig,
    SourceError,
};

/// Where the speed table lives.
///
/// # Examples
/// ```
/// use eta_data::SpeedTableLocation;
///
/// let location: SpeedTableLocation = "s3://speed-maps/regional.csv".parse()?;
/// assert_eq!(
///     location,
///     SpeedTableLocation::S3 { bucket: "speed-maps".into(), key: "regional.csv".into() },
/// );
/// let local = "speeds.csv".parse::<SpeedTableLocation>()?;
/// assert!(matches!(local, SpeedTableLocation::File(_)));
/// # Ok::<(), eta_data::LocationParseError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeedTableLocation {
    /// An object in S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// An `http` or `https` URL.
    Http(Url),
    /// A local file.
    File(Utf8PathBuf),
}

/// Errors returned by [`SpeedTableLocation::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationParseError {
    /// The location string was empty.
    #[error("speed table location is empty")]
    Empty,
    /// An `s3://` location lacked a bucket or key.
    #[error("s3 location {0:?} must look like s3://bucket/key")]
    IncompleteS3(String),
    /// The URL could not be parsed.
    #[error("invalid speed table URL {input:?}: {reason}")]
    InvalidUrl {
        /// Location as written.
        input: String,
        /// Parser message.
        reason: String,
    },
    /// The scheme is not one of `s3`, `http`, `https` or `file`.
    #[error("unsupported scheme {0:?} in speed table location")]
    UnsupportedScheme(String),
}

impl SpeedTableLocation {
    /// Parse `s3://bucket/key`, `http(s)://…`, `file://path` or a bare path.
    ///
    /// # Errors
    ///
    /// Returns [`LocationParseError`] when the string is empty, malformed or
    /// uses an unsupported scheme.
    pub fn parse(input: &str) -> Result<Self, LocationParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LocationParseError::Empty);
        }
        let Some((scheme, rest)) = input.split_once("://") else {
            return Ok(Self::File(Utf8PathBuf::from(input)));
        };
        match scheme.to_ascii_lowercase().as_str() {
            "s3" => {
                let (bucket, key) = rest
                    .split_once('/')
                    .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
                    .ok_or_else(|| LocationParseError::IncompleteS3(input.to_owned()))?;
                Ok(Self::S3 {
                    bucket: bucket.to_owned(),
                    key: key.to_owned(),
                })
            }
            "http" | "https" => Url::parse(input)
                .map(Self::Http)
                .map_err(|err| LocationParseError::InvalidUrl {
                    input: input.to_owned(),
                    reason: err.to_string(),
                }),
            "file" => Ok(Self::File(Utf8PathBuf::from(rest))),
            other => Err(LocationParseError::UnsupportedScheme(other.to_owned())),
        }
    }

    /// Build the source for this location.
    ///
    /// Object storage sources resolve AWS credentials and region from the
    /// environment, which is why this is asynchronous.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the HTTP client cannot be built or when
    /// this build lacks object storage support.
    pub async fn open(
        &self,
        http: &HttpSpeedTableSourceConfig,
    ) -> Result<DynSpeedTableSource, SourceError> {
        match self {
            Self::File(path) => Ok(Box::new(FileSpeedTableSource::new(path.clone()))),
            Self::Http(url) => HttpSpeedTableSource::with_config(url.clone(), http)
                .map(|source| Box::new(source) as DynSpeedTableSource)
                .map_err(|source| SourceError::Network {
                    url: url.to_string(),
                    source,
                }),
            Self::S3 { bucket, key } => open_s3(bucket, key).await,
        }
    }
}

#[cfg(feature = "source-s3")]
async fn open_s3(bucket: &str, key: &str) -> Result<DynSpeedTableSource, SourceError> {
    let source = super::S3SpeedTableSource::from_env(bucket, key).await;
    Ok(Box::new(source))
}

#[cfg(not(feature = "source-s3"))]
async fn open_s3(bucket: &str, key: &str) -> Result<DynSpeedTableSource, SourceError> {
    Err(SourceError::Unsupported {
        location: format!("s3://{bucket}/{key}"),
        feature: "source-s3",
    })
}

impl FromStr for SpeedTableLocation {
    type Err = LocationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SpeedTableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Self::Http(url) => write!(f, "{url}"),
            Self::File(path) => write!(f, "{path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("s3://bucket/a/b.csv", SpeedTableLocation::S3 { bucket: "bucket".into(), key: "a/b.csv".into() })]
    #[case("file:///srv/speeds.csv", SpeedTableLocation::File("/srv/speeds.csv".into()))]
    #[case("  speeds.csv ", SpeedTableLocation::File("speeds.csv".into()))]
    fn parses_supported_locations(#[case] input: &str, #[case] expected: SpeedTableLocation) {
        assert_eq!(SpeedTableLocation::parse(input), Ok(expected));
    }

    #[rstest]
    fn parses_http_urls() {
        let parsed = SpeedTableLocation::parse("https://example.com/speeds.csv").expect("url");
        match parsed {
            SpeedTableLocation::Http(url) => assert_eq!(url.host_str(), Some("example.com")),
            other => panic!("expected Http, found {other:?}"),
        }
    }

    #[rstest]
    #[case("", LocationParseError::Empty)]
    #[case("s3://bucket", LocationParseError::IncompleteS3("s3://bucket".into()))]
    #[case("s3:///key", LocationParseError::IncompleteS3("s3:///key".into()))]
    #[case("ftp://host/file", LocationParseError::UnsupportedScheme("ftp".into()))]
    fn rejects_malformed_locations(#[case] input: &str, #[case] expected: LocationParseError) {
        assert_eq!(SpeedTableLocation::parse(input), Err(expected));
    }

    #[rstest]
    #[case("s3://bucket/key.csv")]
    #[case("https://example.com/speeds.csv")]
    #[case("speeds.csv")]
    fn display_round_trips(#[case] input: &str) {
        let parsed = SpeedTableLocation::parse(input).expect("valid location");
        assert_eq!(parsed.to_string(), input);
    }
}
