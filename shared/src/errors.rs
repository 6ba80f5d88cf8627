/// Unified error types for Weightfetch.
use thiserror::Error;

/// Top-level error type for a download run.
#[derive(Debug, Error)]
pub enum WeightfetchError {
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced while turning a model identifier into download URLs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Invalid model version for public link: {0}")]
    UnknownPublicModel(String),

    #[error("Invalid model version for private link: {0}")]
    UnknownPrivateModel(String),

    #[error("Private link requires a base URL")]
    MissingBaseUrl,

    #[error("Invalid link type: {0} (expected \"public\" or \"private\")")]
    UnknownLinkType(String),

    #[error("URL has no file name: {0}")]
    NoFileName(String),
}

/// Errors raised while validating command-line arguments and environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Usage (private link): <link_type> <model_version> <output_directory> <external_IP> <external_port>")]
    MissingEndpoint,

    #[error("{0} not set!")]
    MissingToken(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Failed to create directory {path}: {reason}")]
    CreateDir { path: String, reason: String },

    #[error("Output path exists and is not a directory: {0}")]
    NotADirectory(String),
}

/// Errors from a single file transfer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Failed to create {path}: {reason}")]
    CreateFile { path: String, reason: String },

    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to read body of {url}: {reason}")]
    Stream { url: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Transfer of {0} was cancelled before it started")]
    Cancelled(String),

    #[error("Two URLs map to the same local file: {0}")]
    DuplicateFile(String),

    #[error("Transfer task did not finish: {0}")]
    Join(String),
}

impl TransferError {
    /// URL the error refers to, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            TransferError::Request { url, .. }
            | TransferError::Status { url, .. }
            | TransferError::Stream { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Whether the server answered with an authentication failure.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, TransferError::Status { status: 401 | 403, .. })
    }
}

/// Result type alias for Weightfetch operations.
pub type WeightfetchResult<T> = Result<T, WeightfetchError>;
