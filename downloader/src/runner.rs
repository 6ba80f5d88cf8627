/// Fan-out of one tokio task per download job.
///
/// All tasks start at once (or as queue slots free up when a limit is set).
/// The first failure aborts the remaining tasks.
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use weightfetch_shared::errors::TransferError;
use weightfetch_shared::models::{DownloadJob, DownloadResult};
use weightfetch_shared::progress::ProgressSink;
use weightfetch_shared::task_queue::TransferQueue;

use crate::fetch::Fetcher;

/// Download every job concurrently. Results come back in job order.
pub async fn run_all(
    fetcher: Fetcher,
    jobs: Vec<DownloadJob>,
    token: Option<String>,
    queue: TransferQueue,
    sink: Arc<dyn ProgressSink>,
) -> Result<Vec<DownloadResult>, TransferError> {
    for job in &jobs {
        if !queue.enqueue(&job.file_name).await {
            return Err(TransferError::DuplicateFile(job.file_name.clone()));
        }
    }

    info!(
        "Starting {} transfers (concurrency: {})",
        jobs.len(),
        queue
            .max_concurrent()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unbounded".to_string())
    );

    let token: Option<Arc<str>> = token.map(Arc::from);
    let mut set = JoinSet::new();
    for (index, job) in jobs.iter().cloned().enumerate() {
        let fetcher = fetcher.clone();
        let queue = queue.clone();
        let sink = sink.clone();
        let token = token.clone();
        set.spawn(async move {
            let outcome = transfer_one(&fetcher, &job, token.as_deref(), &queue, sink.as_ref()).await;
            (index, job.file_name, outcome)
        });
    }

    let mut results: Vec<Option<DownloadResult>> = vec![None; jobs.len()];
    while let Some(joined) = set.join_next().await {
        let (index, file_name, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                abort_remaining(&mut set, &queue).await;
                return Err(TransferError::Join(e.to_string()));
            }
        };

        match outcome {
            Ok(result) => results[index] = Some(result),
            Err(e) => {
                error!("Transfer of {} failed: {}", file_name, e);
                abort_remaining(&mut set, &queue).await;
                return Err(e);
            }
        }
    }

    Ok(results.into_iter().flatten().collect())
}

/// Abort every task still in `set` and wait until each has been dropped, so
/// their partial files are gone before the caller returns.
async fn abort_remaining<T: 'static>(set: &mut JoinSet<T>, queue: &TransferQueue) {
    set.abort_all();
    queue.cancel_pending().await;
    while set.join_next().await.is_some() {}
}

/// Run a single transfer, keeping the queue and sink informed.
async fn transfer_one(
    fetcher: &Fetcher,
    job: &DownloadJob,
    token: Option<&str>,
    queue: &TransferQueue,
    sink: &dyn ProgressSink,
) -> Result<DownloadResult, TransferError> {
    let Some(_permit) = queue.acquire(&job.file_name).await else {
        return Err(TransferError::Cancelled(job.file_name.clone()));
    };

    match fetcher.fetch_to_file(job, token, queue, sink).await {
        Ok(result) => {
            queue.complete(&job.file_name, result.bytes).await;
            sink.on_finish(&result);
            Ok(result)
        }
        Err(e) => {
            let message = e.to_string();
            queue.fail(&job.file_name, &message).await;
            sink.on_error(&job.file_name, &message);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::RecordingSink;
    use weightfetch_shared::catalog::resolve_urls;
    use weightfetch_shared::models::{FileStatus, LinkType};
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_downloads_every_public_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/tiiuae/falcon-7b/(raw|resolve)/main/.+$"))
            .respond_with(ResponseTemplate::new(200).set_body_string("weights"))
            .expect(10)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let urls = resolve_urls(LinkType::Public, "tiiuae/falcon-7b", Some(server.uri().as_str())).unwrap();
        let jobs = DownloadJob::for_urls(&urls, dir.path()).unwrap();
        let queue = TransferQueue::new(None);

        let results = run_all(
            Fetcher::new(None).unwrap(),
            jobs.clone(),
            None,
            queue.clone(),
            Arc::new(RecordingSink::default()),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 10);
        for (job, result) in jobs.iter().zip(&results) {
            assert_eq!(job.url, result.url);
            assert!(job.dest.exists());
        }
        assert!(dir.path().join("pytorch_model-00002-of-00002.bin").exists());
        assert!(dir.path().join("modeling_falcon.py").exists());
        assert_eq!(queue.stats().await.completed, 10);
    }

    #[tokio::test]
    async fn test_bounded_concurrency_still_completes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 2048]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let base = format!("{}/download/", server.uri());
        let urls = resolve_urls(LinkType::Private, "llama-2-70b", Some(base.as_str())).unwrap();
        let jobs = DownloadJob::for_urls(&urls, dir.path()).unwrap();

        let results = run_all(
            Fetcher::new(None).unwrap(),
            jobs,
            Some("token".to_string()),
            TransferQueue::new(Some(2)),
            Arc::new(RecordingSink::default()),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 9);
        assert!(results.iter().all(|r| r.bytes == 2048));
    }

    #[tokio::test]
    async fn test_first_failure_aborts_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download/llama-2-13b/params.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/download/llama-2-13b/consolidated\.\d{2}\.pth$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 16])
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let base = format!("{}/download/", server.uri());
        let urls = resolve_urls(LinkType::Private, "llama-2-13b", Some(base.as_str())).unwrap();
        let jobs = DownloadJob::for_urls(&urls, dir.path()).unwrap();
        let queue = TransferQueue::new(None);
        let sink = Arc::new(RecordingSink::default());

        let started = std::time::Instant::now();
        let err = run_all(
            Fetcher::new(None).unwrap(),
            jobs,
            Some("token".to_string()),
            queue.clone(),
            sink.clone(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TransferError::Status { status: 404, .. }));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(sink.errors.lock().unwrap().as_slice(), ["params.json"]);
        assert_eq!(
            queue.get_status("params.json").await.unwrap().status,
            FileStatus::Failed
        );
        assert_eq!(
            queue.get_status("consolidated.00.pth").await.unwrap().status,
            FileStatus::Cancelled
        );

        let left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(left.is_empty(), "partial files left behind: {:?}", left);
    }

    #[tokio::test]
    async fn test_duplicate_file_names_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let urls = vec![
            format!("{}/tiiuae/falcon-7b/raw/main/config.json", server.uri()),
            format!("{}/tiiuae/falcon-40b/raw/main/config.json", server.uri()),
        ];
        let jobs = DownloadJob::for_urls(&urls, dir.path()).unwrap();

        let err = run_all(
            Fetcher::new(None).unwrap(),
            jobs,
            None,
            TransferQueue::new(None),
            Arc::new(RecordingSink::default()),
        )
        .await
        .unwrap_err();

        assert_eq!(err, TransferError::DuplicateFile("config.json".to_string()));
        assert!(!dir.path().join("config.json").exists());
    }

    #[tokio::test]
    async fn test_cancelled_queue_slot_is_not_a_join_error() {
        let queue = TransferQueue::new(Some(1));
        queue.enqueue("params.json").await;
        queue.cancel_pending().await;

        let dir = tempfile::tempdir().unwrap();
        let job = DownloadJob::new("http://127.0.0.1:1/download/m/params.json", dir.path()).unwrap();
        let err = transfer_one(
            &Fetcher::new(None).unwrap(),
            &job,
            None,
            &queue,
            &RecordingSink::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err, TransferError::Cancelled("params.json".to_string()));
        assert!(!job.dest.exists());
    }
}
