/// Per-file progress tracking and reporting.
///
/// A [`ProgressTracker`] counts bytes as they are written and decides when an
/// update is worth reporting; a [`ProgressSink`] receives those updates.
use tracing::{info, warn};

use crate::models::{DownloadResult, ProgressUpdate};

/// Reporting step when the server sends no Content-Length.
pub const UNKNOWN_TOTAL_STEP: u64 = 8 * 1024 * 1024;

/// Receiver of transfer lifecycle events. Shared across all transfer tasks.
pub trait ProgressSink: Send + Sync {
    fn on_start(&self, file_name: &str, total: Option<u64>);
    fn on_progress(&self, update: &ProgressUpdate);
    fn on_finish(&self, result: &DownloadResult);
    fn on_error(&self, file_name: &str, message: &str);
}

/// Byte counter for a single file.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    file_name: String,
    total: Option<u64>,
    downloaded: u64,
    last_reported: u64,
    reported_once: bool,
}

impl ProgressTracker {
    pub fn new(file_name: impl Into<String>, total: Option<u64>) -> Self {
        Self {
            file_name: file_name.into(),
            total,
            downloaded: 0,
            last_reported: 0,
            reported_once: false,
        }
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Bytes that must accumulate between two reports.
    fn step(&self) -> u64 {
        match self.total {
            Some(total) => (total / 100).max(1),
            None => UNKNOWN_TOTAL_STEP,
        }
    }

    /// Percentage of the known total, capped at 100.
    pub fn percent(&self) -> Option<f64> {
        self.total.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.downloaded as f64 / total as f64 * 100.0).min(100.0)
            }
        })
    }

    fn snapshot(&mut self) -> ProgressUpdate {
        self.last_reported = self.downloaded;
        self.reported_once = true;
        ProgressUpdate {
            file_name: self.file_name.clone(),
            downloaded: self.downloaded,
            total: self.total,
            percent: self.percent(),
        }
    }

    /// Record `len` more bytes. Returns an update once another step has
    /// accumulated, or when the known total is reached.
    pub fn advance(&mut self, len: usize) -> Option<ProgressUpdate> {
        self.downloaded += len as u64;

        let reached_total = self.total.is_some_and(|t| self.downloaded >= t);
        let stepped = self.downloaded - self.last_reported >= self.step();
        if len > 0 && (stepped || reached_total) {
            Some(self.snapshot())
        } else {
            None
        }
    }

    /// Final update at end of stream, unless the last chunk was already reported.
    pub fn finish(&mut self) -> Option<ProgressUpdate> {
        if self.reported_once && self.last_reported == self.downloaded {
            None
        } else {
            Some(self.snapshot())
        }
    }
}

/// Reports progress as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_start(&self, file_name: &str, total: Option<u64>) {
        match total {
            Some(total) => info!("Starting [{}]: {} bytes", file_name, total),
            None => info!("Starting [{}]: size unknown", file_name),
        }
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        match (update.total, update.percent) {
            (Some(total), Some(percent)) => info!(
                "Downloading [{}]: {} out of {} bytes ({:.2}%)",
                update.file_name, update.downloaded, total, percent
            ),
            _ => info!(
                "Downloading [{}]: {} bytes",
                update.file_name, update.downloaded
            ),
        }
    }

    fn on_finish(&self, result: &DownloadResult) {
        info!(
            "Finished [{}]: {} bytes in {} ms",
            result.file_name, result.bytes, result.elapsed_ms
        );
    }

    fn on_error(&self, file_name: &str, message: &str) {
        warn!("Failed [{}]: {}", file_name, message);
    }
}
