//! Streaming artifact download into a staging file.
//!
//! Bytes are written chunk by chunk through a buffered writer, never held in
//! memory as a whole. The staging file is deleted on every failure path, so a
//! partial artifact never outlives the attempt that produced it.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_LENGTH;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::constants::PROGRESS_MIN_INTERVAL;
use crate::core::UpdateError;
use crate::upgrade::remote::BoxFuture;
use crate::utils::fs::remove_quietly;
use crate::utils::progress::{ProgressBar, RateLimiter};

/// A completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// Staging path holding the bytes
    pub path: PathBuf,
    /// Bytes written
    pub len: u64,
    /// Length announced by the server, if any
    pub declared_len: Option<u64>,
}

/// Something that can fetch an artifact into a staging path.
pub trait ArtifactFetcher: Send + Sync {
    /// Download `url` into `staging`. On error, `staging` must not exist.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        staging: &'a Path,
    ) -> BoxFuture<'a, Result<DownloadedFile, UpdateError>>;
}

/// HTTP downloader backed by `reqwest`.
pub struct DownloadManager {
    client: reqwest::Client,
    timeout: Duration,
    show_progress: bool,
}

impl DownloadManager {
    /// Create a downloader. `timeout` bounds the whole transfer.
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            show_progress: true,
        }
    }

    /// Enable or disable the terminal progress bar.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Download `url` into `staging`.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::Network`] on transport errors, non-success status, or timeout
    /// - [`UpdateError::Verification`] if fewer or more bytes than declared arrive
    /// - [`UpdateError::FileSystem`] if the staging file cannot be written
    ///
    /// In every error case the staging file has been removed.
    pub async fn download(&self, url: &str, staging: &Path) -> Result<DownloadedFile, UpdateError> {
        info!("Downloading {}", url);

        let result = match tokio::time::timeout(self.timeout, self.transfer(url, staging)).await {
            Ok(result) => result,
            Err(_) => Err(UpdateError::Network {
                operation: "download".to_string(),
                reason: format!("timed out after {:?}", self.timeout),
            }),
        };

        if result.is_err() {
            remove_quietly(staging).await;
        }
        result
    }

    async fn transfer(&self, url: &str, staging: &Path) -> Result<DownloadedFile, UpdateError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::network("download", e))?
            .error_for_status()
            .map_err(|e| UpdateError::network("download", e))?;

        // Compressed responses would make `content_length()` report the decoded size
        let declared_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        debug!("Declared length: {:?}", declared_len);

        let progress = if self.show_progress {
            ProgressBar::new_download(declared_len)
        } else {
            ProgressBar::hidden()
        };
        if let Some(name) = staging.file_name() {
            progress.set_prefix(name.to_string_lossy().trim_start_matches('.').to_string());
        }

        let result = write_stream(response.bytes_stream(), staging, declared_len, &progress).await;
        progress.finish_and_clear();

        let len = result?;
        Ok(DownloadedFile {
            path: staging.to_path_buf(),
            len,
            declared_len,
        })
    }
}

impl ArtifactFetcher for DownloadManager {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        staging: &'a Path,
    ) -> BoxFuture<'a, Result<DownloadedFile, UpdateError>> {
        Box::pin(self.download(url, staging))
    }
}

/// Write a byte stream into `staging`, checking the total against `declared_len`.
///
/// Transport-independent half of [`DownloadManager::download`]. Returns the
/// number of bytes written. On error the staging file is removed.
pub async fn write_stream<S, T, E>(
    stream: S,
    staging: &Path,
    declared_len: Option<u64>,
    progress: &ProgressBar,
) -> Result<u64, UpdateError>
where
    S: Stream<Item = Result<T, E>>,
    T: AsRef<[u8]>,
    E: Display,
{
    let result = write_stream_inner(stream, staging, declared_len, progress).await;
    if result.is_err() {
        remove_quietly(staging).await;
    }
    result
}

async fn write_stream_inner<S, T, E>(
    stream: S,
    staging: &Path,
    declared_len: Option<u64>,
    progress: &ProgressBar,
) -> Result<u64, UpdateError>
where
    S: Stream<Item = Result<T, E>>,
    T: AsRef<[u8]>,
    E: Display,
{
    let file = File::create(staging)
        .await
        .map_err(|e| UpdateError::fs("create staging file", staging, e))?;
    let mut writer = BufWriter::new(file);
    let mut limiter = RateLimiter::new(PROGRESS_MIN_INTERVAL);
    let mut received: u64 = 0;

    let mut stream = std::pin::pin!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UpdateError::network("download stream", e))?;
        let bytes = chunk.as_ref();
        writer
            .write_all(bytes)
            .await
            .map_err(|e| UpdateError::fs("write staging file", staging, e))?;
        received += bytes.len() as u64;

        if limiter.ready() {
            progress.set_position(received);
            debug!("Received {} of {:?} bytes", received, declared_len);
        }
    }

    writer.flush().await.map_err(|e| UpdateError::fs("flush staging file", staging, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| UpdateError::fs("sync staging file", staging, e))?;
    progress.set_position(received);

    if received == 0 {
        return Err(UpdateError::Verification {
            reason: "download produced no data".to_string(),
        });
    }
    match declared_len {
        Some(expected) if expected != received => Err(UpdateError::Verification {
            reason: format!("expected {expected} bytes, received {received}"),
        }),
        _ => Ok(received),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<&'static [u8], String>> {
        stream::iter(parts.iter().map(|p| Ok::<_, String>(*p)).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_write_stream_complete() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".tool_v3.part");

        let written =
            write_stream(chunks(&[b"abc", b"def"]), &staging, Some(6), &ProgressBar::hidden())
                .await
                .unwrap();

        assert_eq!(written, 6);
        assert_eq!(tokio::fs::read(&staging).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_write_stream_truncated_removes_partial() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".tool_v3.part");

        let result =
            write_stream(chunks(&[b"012345"]), &staging, Some(10), &ProgressBar::hidden()).await;

        assert!(matches!(result, Err(UpdateError::Verification { .. })));
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_write_stream_transport_error_removes_partial() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".tool_v3.part");
        let items: Vec<Result<&'static [u8], String>> =
            vec![Ok(b"half"), Err("connection reset".to_string())];

        let result =
            write_stream(stream::iter(items), &staging, None, &ProgressBar::hidden()).await;

        let err = result.unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("connection reset"));
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_write_stream_empty_body() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".tool_v3.part");

        let result = write_stream(chunks(&[]), &staging, None, &ProgressBar::hidden()).await;

        assert!(result.is_err());
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_download_unreachable_host() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".tool_v3.part");
        let manager = DownloadManager::new(reqwest::Client::new(), Duration::from_secs(5))
            .with_progress(false);

        // Port 9 (discard) on localhost is closed in test environments
        let result = manager.download("http://127.0.0.1:9/tool_v3", &staging).await;

        assert!(matches!(result, Err(UpdateError::Network { .. })));
        assert!(!staging.exists());
    }
}
