/// Transfer queue for the files of one download run.
///
/// Tracks per-file state and, when a limit is configured, bounds the number
/// of concurrent transfers with a tokio Semaphore. Without a limit every
/// transfer starts immediately.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::models::FileStatus;

/// State of a tracked file in the queue.
#[derive(Debug, Clone)]
pub struct TrackedTransfer {
    pub file_name: String,
    pub status: FileStatus,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub error: Option<String>,
    pub enqueued_at: chrono::DateTime<Utc>,
    pub started_at: Option<chrono::DateTime<Utc>>,
    pub finished_at: Option<chrono::DateTime<Utc>>,
}

/// Slot held while a transfer runs. Dropping it frees the slot.
#[derive(Debug)]
pub struct TransferPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Shared transfer queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TransferQueue {
    /// Present only when concurrency is bounded.
    semaphore: Option<Arc<Semaphore>>,
    transfers: Arc<Mutex<HashMap<String, TrackedTransfer>>>,
    max_concurrent: Option<usize>,
}

impl TransferQueue {
    /// `None` or `Some(0)` means unbounded.
    pub fn new(max_concurrent: Option<usize>) -> Self {
        let max_concurrent = max_concurrent.filter(|&n| n > 0);
        Self {
            semaphore: max_concurrent.map(|n| Arc::new(Semaphore::new(n))),
            transfers: Arc::new(Mutex::new(HashMap::new())),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> Option<usize> {
        self.max_concurrent
    }

    /// Register a file. Returns false if already tracked.
    pub async fn enqueue(&self, file_name: &str) -> bool {
        let mut transfers = self.transfers.lock().await;
        if transfers.contains_key(file_name) {
            warn!("Transfer {} already in queue", file_name);
            return false;
        }

        transfers.insert(
            file_name.to_string(),
            TrackedTransfer {
                file_name: file_name.to_string(),
                status: FileStatus::Queued,
                downloaded: 0,
                total: None,
                error: None,
                enqueued_at: Utc::now(),
                started_at: None,
                finished_at: None,
            },
        );

        debug!("Transfer {} enqueued", file_name);
        true
    }

    /// Wait for a slot and mark the file running. Returns `None` if the
    /// transfer was cancelled or the semaphore closed.
    pub async fn acquire(&self, file_name: &str) -> Option<TransferPermit> {
        let permit = match &self.semaphore {
            Some(semaphore) => match semaphore.clone().acquire_owned().await {
                Ok(p) => Some(p),
                Err(_) => {
                    warn!("Semaphore closed for transfer {}", file_name);
                    return None;
                }
            },
            None => None,
        };

        let mut transfers = self.transfers.lock().await;
        if let Some(transfer) = transfers.get_mut(file_name) {
            if transfer.status == FileStatus::Cancelled {
                return None;
            }
            transfer.status = FileStatus::Running;
            transfer.started_at = Some(Utc::now());
        }

        debug!("Transfer {} acquired slot, now running", file_name);
        Some(TransferPermit { _permit: permit })
    }

    /// Update byte counters for a running transfer.
    pub async fn update_progress(&self, file_name: &str, downloaded: u64, total: Option<u64>) {
        if let Some(transfer) = self.transfers.lock().await.get_mut(file_name) {
            transfer.downloaded = downloaded;
            transfer.total = total;
        }
    }

    /// Mark a transfer as completed.
    pub async fn complete(&self, file_name: &str, bytes: u64) {
        if let Some(transfer) = self.transfers.lock().await.get_mut(file_name) {
            transfer.status = FileStatus::Done;
            transfer.downloaded = bytes;
            transfer.finished_at = Some(Utc::now());
        }
        debug!("Transfer {} completed", file_name);
    }

    /// Mark a transfer as failed.
    pub async fn fail(&self, file_name: &str, message: &str) {
        if let Some(transfer) = self.transfers.lock().await.get_mut(file_name) {
            transfer.status = FileStatus::Failed;
            transfer.error = Some(message.to_string());
            transfer.finished_at = Some(Utc::now());
        }
        warn!("Transfer {} failed: {}", file_name, message);
    }

    /// Cancel every transfer that has not finished. Closes the semaphore so
    /// waiting transfers give up. Returns how many were cancelled.
    pub async fn cancel_pending(&self) -> usize {
        if let Some(semaphore) = &self.semaphore {
            semaphore.close();
        }

        let mut transfers = self.transfers.lock().await;
        let mut cancelled = 0;
        for transfer in transfers.values_mut() {
            if matches!(transfer.status, FileStatus::Queued | FileStatus::Running) {
                transfer.status = FileStatus::Cancelled;
                transfer.finished_at = Some(Utc::now());
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!("Cancelled {} pending transfers", cancelled);
        }
        cancelled
    }

    /// Get the current state of a transfer.
    pub async fn get_status(&self, file_name: &str) -> Option<TrackedTransfer> {
        self.transfers.lock().await.get(file_name).cloned()
    }

    /// Get queue statistics.
    pub async fn stats(&self) -> QueueStats {
        let transfers = self.transfers.lock().await;
        let count = |status: FileStatus| transfers.values().filter(|t| t.status == status).count();
        QueueStats {
            max_concurrent: self.max_concurrent,
            running: count(FileStatus::Running),
            queued: count(FileStatus::Queued),
            completed: count(FileStatus::Done),
            failed: count(FileStatus::Failed),
            cancelled: count(FileStatus::Cancelled),
            total_tracked: transfers.len(),
        }
    }
}

/// Queue statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub max_concurrent: Option<usize>,
    pub running: usize,
    pub queued: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_tracked: usize,
}
