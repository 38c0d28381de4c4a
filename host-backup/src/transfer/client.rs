//! Upload/download of the archive artifact with the shared retry policy.

use super::retry::{with_retry, Exhausted, RetryPolicy};
use crate::config::TransferConfig;
use crate::utils::TransferError;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// One network attempt. Implemented over HTTP by
/// [`HttpTransport`](super::http::HttpTransport); faked in tests.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send the file at `path` to `url`; returns the raw response body.
    async fn put_file(&self, url: &str, path: &Path, timeout: Duration) -> Result<String, TransferError>;

    /// Fetch `url` into `path`, following redirects; returns bytes written.
    async fn get_to_file(&self, url: &str, path: &Path, timeout: Duration) -> Result<u64, TransferError>;
}

/// Moves the artifact to and from the file host.
#[derive(Debug, Clone)]
pub struct TransferClient<T> {
    transport: T,
    base_url: String,
    policy: RetryPolicy,
    upload_timeout: Duration,
    download_timeout: Duration,
}

impl<T: Transport> TransferClient<T> {
    pub fn new(transport: T, config: &TransferConfig) -> Self {
        Self {
            transport,
            base_url: config.base_url.clone(),
            policy: RetryPolicy::from_config(config),
            upload_timeout: config.upload_timeout(),
            download_timeout: config.download_timeout(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Endpoint for an artifact: the base URL with the file name appended.
    pub fn upload_url(&self, artifact: &Path) -> Result<String, TransferError> {
        let name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidTarget(format!("no file name in {}", artifact.display())))?;

        let mut url = reqwest::Url::parse(self.base_url.trim())
            .map_err(|e| TransferError::InvalidTarget(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| TransferError::InvalidTarget(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push(name);

        Ok(url.to_string())
    }

    /// Upload the artifact and return the locator the host answered with.
    ///
    /// Only a non-empty response counts as success; anything else is a
    /// failed attempt.
    pub async fn upload(&self, artifact: &Path) -> Result<String, Exhausted<TransferError>> {
        with_retry(&self.policy, "Upload", |attempt| async move {
            let result = match self.upload_url(artifact) {
                Ok(url) => {
                    info!("Uploading {} to {} (attempt {})", artifact.display(), url, attempt);
                    self.transport
                        .put_file(&url, artifact, self.upload_timeout)
                        .await
                        .and_then(|body| parse_locator(&body))
                }
                Err(e) => Err(e),
            };

            log_failure("Upload", attempt, &result);
            result
        })
        .await
    }

    /// Download `locator` into `destination`; returns the bytes written.
    pub async fn download(&self, locator: &str, destination: &Path) -> Result<u64, Exhausted<TransferError>> {
        with_retry(&self.policy, "Download", |attempt| async move {
            info!("Downloading {} to {} (attempt {})", locator, destination.display(), attempt);

            let result = self
                .transport
                .get_to_file(locator, destination, self.download_timeout)
                .await;

            log_failure("Download", attempt, &result);
            result
        })
        .await
    }
}

/// The one warning per failed attempt, tagged with its failure class.
fn log_failure<T>(operation: &str, attempt: u32, result: &Result<T, TransferError>) {
    if let Err(e) = result {
        warn!("{} attempt {} failed ({:?}): {}", operation, attempt, e.kind(), e);
    }
}

/// First non-blank line of the response body.
fn parse_locator(body: &str) -> Result<String, TransferError> {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or(TransferError::EmptyLocator)
}
