/// Weightfetch - concurrent model weight downloader
///
/// Downloads the weight files of a Falcon model from Hugging Face, or of a
/// Llama 2 model from a private download server, one concurrent transfer
/// per file.
mod bars;
mod fetch;
mod runner;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use weightfetch_shared::catalog::{resolve_urls, supported_models};
use weightfetch_shared::config::{ensure_dir_exists, Config, RunArgs};
use weightfetch_shared::models::{DownloadJob, LinkType, RunSummary};
use weightfetch_shared::progress::{LogProgress, ProgressSink};
use weightfetch_shared::task_queue::TransferQueue;

use bars::BarProgress;
use fetch::Fetcher;

/// How per-file progress is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProgressMode {
    /// One terminal progress bar per file
    Bars,
    /// Log lines at every 1% step
    Log,
}

#[derive(Debug, Parser)]
#[command(name = "weightfetch", version, about = "Download Falcon or Llama 2 model weights concurrently")]
struct Cli {
    /// Where the files are hosted: "public" (Hugging Face) or "private"
    #[arg(value_parser = parse_link_type)]
    link_type: LinkType,

    /// Model identifier, e.g. tiiuae/falcon-7b or llama-2-13b-chat
    #[arg(required_unless_present = "list_models")]
    model_version: Option<String>,

    /// Directory the files are written to (created if missing)
    #[arg(required_unless_present = "list_models")]
    output_directory: Option<PathBuf>,

    /// Private server address
    external_ip: Option<String>,

    /// Private server port
    external_port: Option<String>,

    /// Limit simultaneous transfers (default: all at once)
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Progress display; defaults to bars on a terminal, log otherwise
    #[arg(long, value_enum)]
    progress: Option<ProgressMode>,

    /// Write a JSON summary of the run to this file
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Print the supported models for the link type and exit
    #[arg(long)]
    list_models: bool,
}

fn parse_link_type(s: &str) -> Result<LinkType, String> {
    s.parse::<LinkType>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mode = cli.progress.unwrap_or(if std::io::stderr().is_terminal() {
        ProgressMode::Bars
    } else {
        ProgressMode::Log
    });
    let bars = match mode {
        ProgressMode::Bars => Some(Arc::new(BarProgress::new())),
        ProgressMode::Log => None,
    };
    init_tracing(bars.as_deref());

    let sink: Arc<dyn ProgressSink> = match bars {
        Some(bars) => bars,
        None => Arc::new(LogProgress),
    };

    if let Err(e) = run(cli, sink).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Log to stderr, through the progress bars when they are drawn there.
fn init_tracing(bars: Option<&BarProgress>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "weightfetch=info,weightfetch_shared=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match bars {
        Some(bars) => builder.with_writer(bars.log_writer()).init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
}

/// Per-run settings that come from flags rather than `Config`.
struct RunOptions {
    max_concurrent: Option<usize>,
    summary: Option<PathBuf>,
    sink: Arc<dyn ProgressSink>,
}

async fn run(cli: Cli, sink: Arc<dyn ProgressSink>) -> Result<()> {
    if cli.list_models {
        for model in supported_models(cli.link_type) {
            println!("{}", model);
        }
        return Ok(());
    }

    let model = cli.model_version.context("missing <MODEL_VERSION>")?;
    let output_dir = cli.output_directory.context("missing <OUTPUT_DIRECTORY>")?;

    let config = Config::from_args(
        RunArgs {
            link_type: cli.link_type,
            model,
            output_dir,
            external_ip: cli.external_ip,
            external_port: cli.external_port,
        },
        |key| std::env::var(key).ok(),
    )?;

    let options = RunOptions {
        max_concurrent: cli.max_concurrent,
        summary: cli.summary,
        sink,
    };
    download(config, options).await?;
    Ok(())
}

/// Create the output directory, resolve the model's files and fetch them all.
async fn download(config: Config, options: RunOptions) -> Result<RunSummary> {
    ensure_dir_exists(&config.output_dir)?;

    let urls = resolve_urls(config.link_type, &config.model, Some(config.base_url.as_str()))?;
    let jobs = DownloadJob::for_urls(&urls, &config.output_dir)?;
    info!(
        "Downloading {} ({} link): {} files into {}",
        config.model,
        config.link_type,
        jobs.len(),
        config.output_dir.display()
    );

    let fetcher = Fetcher::new(config.timeout)?;
    let queue = TransferQueue::new(options.max_concurrent);

    let started = Instant::now();
    let results = runner::run_all(fetcher, jobs, config.token.clone(), queue.clone(), options.sink).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let summary = RunSummary::new(
        config.link_type,
        &config.model,
        &config.output_dir,
        results,
        elapsed_ms,
    );
    let stats = queue.stats().await;
    info!(
        "Downloaded {} files, {} bytes in {:.1}s",
        stats.completed,
        summary.total_bytes,
        elapsed_ms as f64 / 1000.0
    );

    if let Some(path) = options.summary {
        let json = summary.to_json()?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }

    Ok(summary)
}
