//! Async download module with concurrent progress reporting.
//!
//! A file that already exists at the destination is never fetched again.
//! Bytes are streamed into a sibling `.part` file that is renamed into place
//! only once the declared length has been received, so an interrupted run
//! never leaves a truncated artifact under the final name.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use armrepo_schema::FetchedArtifact;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;

use crate::Reporter;

/// Progress samples per second while a transfer is in flight.
pub const PROGRESS_RATE_HZ: u32 = 60;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url}: response has no Content-Length header")]
    MissingContentLength { url: String },

    #[error("{url}: expected {expected} bytes, received {actual}")]
    Truncated {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Progress reporter failed: {0}")]
    Reporter(#[from] tokio::task::JoinError),
}

impl DownloadError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of a [`Downloader::fetch`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The destination already existed; nothing was transferred.
    Skipped,
    /// The file was transferred during this call.
    Fetched(FetchedArtifact),
}

impl FetchOutcome {
    /// Whether a transfer actually happened.
    pub fn was_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

/// Fetches a URL to a local path.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` to `dest` unless `dest` already exists.
    async fn fetch(&self, dest: &Path, url: &str) -> Result<FetchOutcome, DownloadError>;
}

/// [`Downloader`] backed by reqwest.
#[derive(Clone)]
pub struct HttpDownloader {
    client: Client,
    reporter: Arc<dyn Reporter>,
    interval: Duration,
}

impl std::fmt::Debug for HttpDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDownloader")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl HttpDownloader {
    pub fn new(client: Client, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            client,
            reporter,
            interval: Duration::from_secs(1) / PROGRESS_RATE_HZ,
        }
    }

    /// Override the progress sampling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, dest: &Path, url: &str) -> Result<FetchOutcome, DownloadError> {
        if tokio::fs::try_exists(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?
        {
            tracing::debug!("{} already present, skipping", dest.display());
            return Ok(FetchOutcome::Skipped);
        }

        tracing::debug!("Fetching {url}");
        self.reporter.fetching(url);
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        // Checked before anything touches the filesystem.
        let expected = response
            .content_length()
            .ok_or_else(|| DownloadError::MissingContentLength {
                url: url.to_string(),
            })?;

        let label = file_label(dest);
        let part = part_path(dest);
        let mut file = File::create(&part)
            .await
            .map_err(|e| DownloadError::io(&part, e))?;

        let (progress_tx, progress_rx) = watch::channel(0u64);
        let (stop_tx, stop_rx) = oneshot::channel();
        let reporter_task = tokio::spawn(report_progress(
            self.reporter.clone(),
            label.clone(),
            expected,
            progress_rx,
            stop_rx,
            self.interval,
        ));

        let copied = copy_body(response, &mut file, &part, &progress_tx).await;

        // Rendezvous: wait for the reporter to emit its final sample and exit.
        let _ = stop_tx.send(());
        let joined = reporter_task.await;
        drop(file);

        let written = match (copied, joined) {
            (Ok(written), Ok(())) => written,
            (Err(e), _) => {
                discard(&part).await;
                return Err(e);
            }
            (Ok(_), Err(e)) => {
                discard(&part).await;
                return Err(e.into());
            }
        };

        if written != expected {
            discard(&part).await;
            return Err(DownloadError::Truncated {
                url: url.to_string(),
                expected,
                actual: written,
            });
        }

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;

        let elapsed = start.elapsed();
        tracing::debug!("{label}: {written} bytes in {:.2}s", elapsed.as_secs_f64());
        self.reporter.downloaded(&label, written, elapsed);

        Ok(FetchOutcome::Fetched(FetchedArtifact::new(dest, written)))
    }
}

/// Streams the response body into `file`, publishing the running byte count.
async fn copy_body(
    response: reqwest::Response,
    file: &mut File,
    path: &Path,
    progress: &watch::Sender<u64>,
) -> Result<u64, DownloadError> {
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        written += chunk.len() as u64;
        progress.send_replace(written);
    }

    file.flush().await.map_err(|e| DownloadError::io(path, e))?;
    file.sync_all()
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    Ok(written)
}

/// Samples the byte count at a fixed rate until told to stop, then emits one
/// final sample.
async fn report_progress(
    reporter: Arc<dyn Reporter>,
    label: String,
    total: u64,
    progress: watch::Receiver<u64>,
    mut stop: oneshot::Receiver<()>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut stop => {
                reporter.downloading(&label, *progress.borrow(), total);
                return;
            }
            _ = ticker.tick() => {
                reporter.downloading(&label, *progress.borrow(), total);
            }
        }
    }
}

/// Sibling path used while a transfer is in flight: `<dest>.part`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn file_label(dest: &Path) -> String {
    dest.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn discard(part: &Path) {
    if let Err(e) = tokio::fs::remove_file(part).await {
        tracing::warn!("Failed to remove {}: {e}", part.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use mockito::Server;
    use std::io::Write as _;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingReporter {
        samples: Mutex<Vec<(u64, u64)>>,
        completed: Mutex<Vec<(String, u64)>>,
    }

    impl Reporter for RecordingReporter {
        fn section(&self, _: &str) {}
        fn fetching(&self, _: &str) {}
        fn downloading(&self, _: &str, current: u64, total: u64) {
            self.samples.lock().unwrap().push((current, total));
        }
        fn downloaded(&self, label: &str, size: u64, _: Duration) {
            self.completed
                .lock()
                .unwrap()
                .push((label.to_string(), size));
        }
        fn registered(&self, _: &str, _: &str) {}
        fn info(&self, _: &str) {}
        fn success(&self, _: &str) {}
        fn warning(&self, _: &str) {}
        fn error(&self, _: &str) {}
        fn summary(&self, _: usize, _: &str, _: f64) {}
    }

    fn downloader(reporter: Arc<dyn Reporter>) -> HttpDownloader {
        HttpDownloader::new(Client::new(), reporter)
    }

    #[tokio::test]
    async fn test_fetch_writes_file() {
        let mut server = Server::new_async().await;
        let body = vec![7u8; 4096];
        let mock = server
            .mock("GET", "/core/kio-git-5.1-1-aarch64.pkg.tar.xz")
            .with_status(200)
            .with_body(&body)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("kio-git-5.1-1-aarch64.pkg.tar.xz");
        let reporter = Arc::new(RecordingReporter::default());
        let url = format!("{}/core/kio-git-5.1-1-aarch64.pkg.tar.xz", server.url());

        let outcome = downloader(reporter.clone())
            .fetch(&dest, &url)
            .await
            .unwrap();

        mock.assert_async().await;
        let FetchOutcome::Fetched(artifact) = outcome else {
            panic!("expected a transfer");
        };
        assert_eq!(artifact.filename, "kio-git-5.1-1-aarch64.pkg.tar.xz");
        assert_eq!(artifact.size_bytes, 4096);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!part_path(&dest).exists());

        // The final sample is emitted after the transfer completes.
        let samples = reporter.samples.lock().unwrap();
        assert_eq!(samples.last(), Some(&(4096, 4096)));
        assert_eq!(
            reporter.completed.lock().unwrap().as_slice(),
            [("kio-git-5.1-1-aarch64.pkg.tar.xz".to_string(), 4096)]
        );
    }

    #[tokio::test]
    async fn test_fetch_skips_existing_file() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/x.pkg.tar.xz")
            .with_status(200)
            .with_body("new contents")
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.pkg.tar.xz");
        std::fs::write(&dest, b"old contents").unwrap();

        let outcome = downloader(Arc::new(NullReporter))
            .fetch(&dest, &format!("{}/x.pkg.tar.xz", server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(outcome, FetchOutcome::Skipped);
        assert_eq!(std::fs::read(&dest).unwrap(), b"old contents");
    }

    #[tokio::test]
    async fn test_missing_content_length_writes_nothing() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/core.db")
            .with_status(200)
            .with_chunked_body(|w| w.write_all(b"streamed without a length"))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("core.db");

        let err = downloader(Arc::new(NullReporter))
            .fetch(&dest, &format!("{}/core.db", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::MissingContentLength { .. }));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/gone.pkg.tar.xz")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("gone.pkg.tar.xz");

        let err = downloader(Arc::new(NullReporter))
            .fetch(&dest, &format!("{}/gone.pkg.tar.xz", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Status { status: 404, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_missing_parent_directory_is_io_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/a.pkg.tar.xz")
            .with_status(200)
            .with_body("abc")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing").join("a.pkg.tar.xz");

        let err = downloader(Arc::new(NullReporter))
            .fetch(&dest, &format!("{}/a.pkg.tar.xz", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Io { .. }));
    }

    #[tokio::test]
    async fn test_interrupted_body_leaves_nothing() {
        use tokio::io::AsyncReadExt;

        // Promises 100 bytes, sends 10, then hangs up.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cut.pkg.tar.xz");

        let err = downloader(Arc::new(NullReporter))
            .fetch(&dest, &format!("http://{addr}/cut.pkg.tar.xz"))
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(
            err,
            DownloadError::Http(_) | DownloadError::Truncated { .. }
        ));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn test_truncated_message_names_sizes() {
        let err = DownloadError::Truncated {
            url: "https://mirror.example/a.pkg.tar.xz".to_string(),
            expected: 100,
            actual: 10,
        };
        assert_eq!(
            err.to_string(),
            "https://mirror.example/a.pkg.tar.xz: expected 100 bytes, received 10"
        );
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("repo/x/aarch64/a.pkg.tar.xz")),
            PathBuf::from("repo/x/aarch64/a.pkg.tar.xz.part")
        );
    }
}
