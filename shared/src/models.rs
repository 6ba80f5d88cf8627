/// Data types shared by the resolver, the transfer queue and the downloader.
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::file_name_from_url;
use crate::errors::ResolveError;

/// Where a model's files are hosted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Public Hugging Face repository, no credentials.
    Public,
    /// Private download server, bearer token required.
    Private,
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkType::Public => write!(f, "public"),
            LinkType::Private => write!(f, "private"),
        }
    }
}

impl FromStr for LinkType {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(LinkType::Public),
            "private" => Ok(LinkType::Private),
            other => Err(ResolveError::UnknownLinkType(other.to_string())),
        }
    }
}

/// Transfer status of a single file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Queued => write!(f, "queued"),
            FileStatus::Running => write!(f, "running"),
            FileStatus::Done => write!(f, "done"),
            FileStatus::Failed => write!(f, "failed"),
            FileStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One URL to fetch and the local file it lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub file_name: String,
    pub dest: PathBuf,
}

impl DownloadJob {
    /// Build a job writing into `output_dir` under the URL's last path segment.
    pub fn new(url: impl Into<String>, output_dir: &Path) -> Result<Self, ResolveError> {
        let url = url.into();
        let file_name =
            file_name_from_url(&url).ok_or_else(|| ResolveError::NoFileName(url.clone()))?;
        let dest = output_dir.join(&file_name);
        Ok(Self { url, file_name, dest })
    }

    /// Build jobs for every URL, preserving order.
    pub fn for_urls(urls: &[String], output_dir: &Path) -> Result<Vec<Self>, ResolveError> {
        urls.iter().map(|u| Self::new(u.as_str(), output_dir)).collect()
    }
}

/// Progress snapshot for one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub file_name: String,
    pub downloaded: u64,
    /// Content-Length, when the server sent one.
    pub total: Option<u64>,
    pub percent: Option<f64>,
}

/// Completed transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadResult {
    pub url: String,
    pub file_name: String,
    pub file_path: String,
    pub bytes: u64,
    pub elapsed_ms: u64,
}

/// Summary of a whole run, written by `--summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub link_type: LinkType,
    pub model: String,
    pub output_dir: String,
    pub files: Vec<DownloadResult>,
    pub total_bytes: u64,
    pub elapsed_ms: u64,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl RunSummary {
    pub fn new(
        link_type: LinkType,
        model: &str,
        output_dir: &Path,
        files: Vec<DownloadResult>,
        elapsed_ms: u64,
    ) -> Self {
        let total_bytes = files.iter().map(|f| f.bytes).sum();
        Self {
            link_type,
            model: model.to_string(),
            output_dir: output_dir.display().to_string(),
            files,
            total_bytes,
            elapsed_ms,
            finished_at: chrono::Utc::now(),
        }
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
