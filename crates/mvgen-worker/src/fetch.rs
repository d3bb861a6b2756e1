//! Downloads of remote artifacts into scratch space.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// HTTP client for artifact downloads.
pub fn download_client(timeout: Duration) -> WorkerResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| WorkerError::config_error(format!("failed to build download client: {}", e)))
}

/// Stream `url` into `dest`, returning the number of bytes written.
pub async fn download_to(http: &Client, url: &str, dest: &Path) -> WorkerResult<u64> {
    let started = Instant::now();

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| WorkerError::download_failed(format!("{}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(WorkerError::download_failed(format!("{} returned {}", url, status)));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut body = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| WorkerError::download_failed(format!("{}: {}", url, e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(WorkerError::download_failed(format!("{} returned an empty body", url)));
    }

    metrics::record_download(started.elapsed().as_secs_f64());
    debug!("Downloaded {} bytes from {} to {}", written, url, dest.display());
    Ok(written)
}

/// Download `urls` into `dir`, at most `concurrency` at a time.
///
/// Returned paths are in the order of `urls`.
pub async fn download_all(
    http: &Client,
    urls: &[String],
    dir: &Path,
    concurrency: usize,
) -> WorkerResult<Vec<PathBuf>> {
    // Futures are built eagerly (they stay lazy until polled) so the stream
    // type carries no higher-ranked closure lifetimes; this keeps the
    // returned future `Send` for async-trait callers.
    let downloads: Vec<_> = urls
        .iter()
        .enumerate()
        .map(|(index, url)| async move {
            let dest = dir.join(format!("clip_{:03}.mp4", index));
            download_to(http, url, &dest).await?;
            Ok::<_, WorkerError>(dest)
        })
        .collect();
    stream::iter(downloads)
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_writes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/track.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3-audio".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("audio.mp3");
        let http = download_client(Duration::from_secs(5)).unwrap();

        let written = download_to(&http, &format!("{}/track.mp3", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, 9);
        assert_eq!(std::fs::read(&dest).unwrap(), b"ID3-audio");
    }

    #[tokio::test]
    async fn test_error_status_is_download_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let http = download_client(Duration::from_secs(5)).unwrap();
        let err = download_to(&http, &format!("{}/gone.mp4", server.uri()), &dir.path().join("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::DownloadFailed(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_download_all_keeps_order() {
        let server = MockServer::start().await;
        for name in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/{}.mp4", name)))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(name.as_bytes().to_vec()))
                .mount(&server)
                .await;
        }

        let urls: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|name| format!("{}/{}.mp4", server.uri(), name))
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let http = download_client(Duration::from_secs(5)).unwrap();

        let paths = download_all(&http, &urls, dir.path(), 2).await.unwrap();

        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("clip_000.mp4"));
        assert_eq!(std::fs::read(&paths[2]).unwrap(), b"c");
    }
}
