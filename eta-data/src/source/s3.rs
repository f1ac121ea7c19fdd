//! Object storage source backed by the AWS SDK.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;

use super::{SourceError, SpeedTableSource};

/// Downloads the speed table object from an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3SpeedTableSource {
    client: Client,
    bucket: String,
    key: String,
}

impl S3SpeedTableSource {
    /// Use an existing client.
    pub fn new(client: Client, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Build a client from the ambient AWS configuration (environment,
    /// profile or instance metadata).
    pub async fn from_env(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config), bucket, key)
    }

    fn error(&self, message: String) -> SourceError {
        SourceError::ObjectStore {
            location: self.describe(),
            message,
        }
    }
}

#[async_trait(?Send)]
impl SpeedTableSource for S3SpeedTableSource {
    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    async fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .map_err(|err| self.error(DisplayErrorContext(&err).to_string()))?;
        let body = object
            .body
            .collect()
            .await
            .map_err(|err| self.error(err.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }
}
