//! HTTP transport for anonymous file hosts (PUT to upload, GET to fetch).

use super::client::Transport;
use super::progress::{format_bytes, format_duration, format_speed, TransferMeter};
use super::progress_stream::{ProgressCallback, ProgressStream};
use crate::utils::TransferError;
use futures_util::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::redirect::Policy;
use reqwest::{Body, Client, Response};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// Longest error body kept in a [`TransferError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// How often upload progress is logged
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransferError> {
        let client = Client::builder()
            .user_agent(concat!("host-backup/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

/// Turn a non-2xx response into an error carrying (part of) its body.
async fn check_status(response: Response) -> Result<Response, TransferError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(TransferError::Status {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

impl Transport for HttpTransport {
    async fn put_file(&self, url: &str, path: &Path, timeout: Duration) -> Result<String, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();

        let meter = Mutex::new(TransferMeter::new(total));
        let progress_callback: ProgressCallback = Arc::new(move |sent: u64| {
            if let Ok(mut meter) = meter.lock() {
                let snapshot = meter.record(sent);
                info!(
                    "Uploaded {} of {} ({:.1}%, {}, eta {})",
                    format_bytes(snapshot.sent),
                    format_bytes(snapshot.total),
                    snapshot.percent,
                    format_speed(snapshot.speed),
                    snapshot
                        .eta
                        .map(|eta| format_duration(eta.as_secs()))
                        .unwrap_or_else(|| "unknown".to_string()),
                );
            }
        });
        let stream = ProgressStream::new(ReaderStream::new(file), progress_callback)
            .with_interval(PROGRESS_INTERVAL);

        let response = self
            .client
            .put(url)
            .timeout(timeout)
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(stream))
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response.text().await?)
    }

    async fn get_to_file(&self, url: &str, path: &Path, timeout: Duration) -> Result<u64, TransferError> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        if response.url().as_str() != url {
            debug!("Redirected to {}", response.url());
        }
        let response = check_status(response).await?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        info!("Downloaded {} to {}", format_bytes(written), path.display());
        Ok(written)
    }
}
