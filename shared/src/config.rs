/// Run configuration assembled from positional arguments and environment.
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::catalog::{private_base_url, PUBLIC_BASE_URL};
use crate::errors::ConfigError;
use crate::models::LinkType;

/// Environment variable holding the private server's bearer token.
pub const AUTH_TOKEN_ENV: &str = "AUTH_TOKEN_ENV_VAR";
/// Optional override of the public host (mirrors, tests).
pub const PUBLIC_BASE_ENV: &str = "WEIGHTFETCH_PUBLIC_BASE_URL";
/// Optional whole-request timeout in seconds.
pub const HTTP_TIMEOUT_ENV: &str = "WEIGHTFETCH_TIMEOUT_SECS";

/// Raw arguments as they come off the command line.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub link_type: LinkType,
    pub model: String,
    pub output_dir: PathBuf,
    pub external_ip: Option<String>,
    pub external_port: Option<String>,
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub link_type: LinkType,
    pub model: String,
    pub output_dir: PathBuf,
    /// Root that model paths are appended to.
    pub base_url: String,
    /// Bearer token, private links only.
    pub token: Option<String>,
    pub timeout: Option<Duration>,
}

impl Config {
    /// Validate arguments. `env` looks up environment variables, so callers
    /// pass `|k| std::env::var(k).ok()` and tests pass a fixed map.
    pub fn from_args<F>(args: RunArgs, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let (base_url, token) = match args.link_type {
            LinkType::Public => {
                let base = non_empty(PUBLIC_BASE_ENV).unwrap_or_else(|| PUBLIC_BASE_URL.to_string());
                (base, None)
            }
            LinkType::Private => {
                let (ip, port) = match (&args.external_ip, &args.external_port) {
                    (Some(ip), Some(port)) => (ip, port),
                    _ => return Err(ConfigError::MissingEndpoint),
                };
                let port: u16 = port
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
                let token = non_empty(AUTH_TOKEN_ENV)
                    .ok_or_else(|| ConfigError::MissingToken(AUTH_TOKEN_ENV.to_string()))?;
                (private_base_url(ip, port), Some(token))
            }
        };

        let timeout = non_empty(HTTP_TIMEOUT_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            link_type: args.link_type,
            model: args.model,
            output_dir: args.output_dir,
            base_url,
            token,
            timeout,
        })
    }
}

/// Create `dir` (and parents) if it does not exist yet.
pub fn ensure_dir_exists(dir: &Path) -> Result<(), ConfigError> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ConfigError::NotADirectory(dir.display().to_string()));
        }
        return Ok(());
    }

    std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    info!("Created output directory {}", dir.display());
    Ok(())
}
