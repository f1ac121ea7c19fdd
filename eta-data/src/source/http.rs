//! HTTP(S) source.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{SourceError, SpeedTableSource};

/// Default user agent for speed table downloads.
pub const DEFAULT_USER_AGENT: &str = "dispatch-eta/0.1";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for [`HttpSpeedTableSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSpeedTableSourceConfig {
    /// Connect and whole-request timeout.
    pub timeout: Duration,
    /// User agent sent with each request.
    pub user_agent: String,
}

impl Default for HttpSpeedTableSourceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpSpeedTableSourceConfig {
    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Downloads the speed table with a plain `GET`.
#[derive(Debug, Clone)]
pub struct HttpSpeedTableSource {
    client: Client,
    url: Url,
}

impl HttpSpeedTableSource {
    /// Create a source with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client fails to build.
    pub fn new(url: Url) -> Result<Self, reqwest::Error> {
        Self::with_config(url, &HttpSpeedTableSourceConfig::default())
    }

    /// Create a source with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client fails to build.
    pub fn with_config(url: Url, config: &HttpSpeedTableSourceConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, url })
    }

    /// The URL this source downloads.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn convert_error(&self, error: reqwest::Error) -> SourceError {
        match error.status() {
            Some(status) => SourceError::Status {
                url: self.url.to_string(),
                status: status.as_u16(),
            },
            None => SourceError::Network {
                url: self.url.to_string(),
                source: error,
            },
        }
    }
}

#[async_trait(?Send)]
impl SpeedTableSource for HttpSpeedTableSource {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    async fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|err| self.convert_error(err))?
            .error_for_status()
            .map_err(|err| self.convert_error(err))?;
        let body = response
            .bytes()
            .await
            .map_err(|err| self.convert_error(err))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn config_builder_pattern() {
        let config = HttpSpeedTableSourceConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("tests/1.0");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "tests/1.0");
    }

    #[rstest]
    fn describes_itself_by_url() {
        let url = Url::parse("https://speeds.example.com/table.csv").expect("valid url");
        let source = HttpSpeedTableSource::new(url).expect("client builds");
        assert_eq!(source.describe(), "https://speeds.example.com/table.csv");
    }

    #[rstest]
    fn unreachable_host_is_a_network_error() {
        // Port 9 on loopback is the discard service and is closed on CI hosts.
        let url = Url::parse("http://127.0.0.1:9/table.csv").expect("valid url");
        let config = HttpSpeedTableSourceConfig::default().with_timeout(Duration::from_secs(2));
        let source = HttpSpeedTableSource::with_config(url, &config).expect("client builds");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let err = runtime
            .block_on(source.fetch())
            .expect_err("nothing listens on the discard port");
        assert!(matches!(err, SourceError::Network { .. }));
    }
}
