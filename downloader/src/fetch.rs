/// Streams a single URL into a local file.
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use weightfetch_shared::errors::TransferError;
use weightfetch_shared::models::{DownloadJob, DownloadResult};
use weightfetch_shared::progress::{ProgressSink, ProgressTracker};
use weightfetch_shared::task_queue::TransferQueue;

/// Deletes the destination file when dropped while still armed.
///
/// Covers both error returns and a task aborted mid-transfer, where the
/// future is dropped without ever returning.
struct PartialFile<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: false }
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => debug!("Removed partial file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial file {}: {}", self.path.display(), e),
        }
    }
}

/// HTTP fetcher shared by all transfer tasks.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Build a fetcher. `timeout` bounds each whole request when set.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransferError> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransferError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Download `job.url` into `job.dest`, removing the file on failure or abort.
    pub async fn fetch_to_file(
        &self,
        job: &DownloadJob,
        token: Option<&str>,
        queue: &TransferQueue,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, TransferError> {
        let start = Instant::now();
        let path = job.dest.display().to_string();

        // Declared before `file` so the handle is closed before removal.
        // The file is created synchronously: a blocking-pool create could
        // still land after an abort has dropped the guard.
        let mut guard = PartialFile::new(&job.dest);
        let file = std::fs::File::create(&job.dest).map_err(|e| TransferError::CreateFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        guard.armed = true;
        let mut file = tokio::fs::File::from_std(file);

        let mut request = self.client.get(&job.url);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        debug!("GET {}", job.url);
        let response = request.send().await.map_err(|e| TransferError::Request {
            url: job.url.clone(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(TransferError::Status {
                url: job.url.clone(),
                status: response.status().as_u16(),
            });
        }

        let total = response.content_length();
        sink.on_start(&job.file_name, total);
        let mut tracker = ProgressTracker::new(job.file_name.clone(), total);

        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|e| TransferError::Stream {
                url: job.url.clone(),
                reason: e.to_string(),
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| TransferError::Write {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;

            if let Some(update) = tracker.advance(chunk.len()) {
                queue.update_progress(&job.file_name, update.downloaded, total).await;
                sink.on_progress(&update);
            }
        }

        file.flush().await.map_err(|e| TransferError::Write {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(update) = tracker.finish() {
            queue.update_progress(&job.file_name, update.downloaded, total).await;
            sink.on_progress(&update);
        }
        guard.armed = false;

        Ok(DownloadResult {
            url: job.url.clone(),
            file_name: job.file_name.clone(),
            file_path: path,
            bytes: tracker.downloaded(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}
