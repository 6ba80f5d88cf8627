//! Terminal progress bars, one per file.
//!
//! Log output has to go through [`BarLogWriter`] while bars are active,
//! otherwise log lines land in the middle of a redraw.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

use weightfetch_shared::models::{DownloadResult, ProgressUpdate};
use weightfetch_shared::progress::ProgressSink;

const BAR_TEMPLATE: &str =
    "{prefix:>32.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{prefix:>32.bold} {spinner} {bytes} ({bytes_per_sec})";

/// Progress sink drawing an indicatif bar per transfer.
pub struct BarProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Writer for `tracing_subscriber` that clears the bars around each line.
    pub fn log_writer(&self) -> BarLogWriter {
        BarLogWriter {
            multi: self.multi.clone(),
        }
    }

    fn style(total: Option<u64>) -> ProgressStyle {
        let template = if total.is_some() { BAR_TEMPLATE } else { SPINNER_TEMPLATE };
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    fn with_bar(&self, file_name: &str, f: impl FnOnce(&ProgressBar)) {
        let bars = match self.bars.lock() {
            Ok(bars) => bars,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(bar) = bars.get(file_name) {
            f(bar);
        }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn on_start(&self, file_name: &str, total: Option<u64>) {
        let bar = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        let bar = self.multi.add(bar);
        bar.set_style(Self::style(total));
        bar.set_prefix(file_name.to_string());

        let mut bars = match self.bars.lock() {
            Ok(bars) => bars,
            Err(poisoned) => poisoned.into_inner(),
        };
        bars.insert(file_name.to_string(), bar);
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        self.with_bar(&update.file_name, |bar| bar.set_position(update.downloaded));
    }

    fn on_finish(&self, result: &DownloadResult) {
        self.with_bar(&result.file_name, |bar| {
            bar.set_position(result.bytes);
            bar.finish();
        });
    }

    fn on_error(&self, file_name: &str, message: &str) {
        self.with_bar(file_name, |bar| bar.abandon_with_message(message.to_string()));
    }
}

/// Stderr writer that suspends the bars while a log line is printed.
#[derive(Clone)]
pub struct BarLogWriter {
    multi: MultiProgress,
}

impl Write for BarLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for BarLogWriter {
    type Writer = BarLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
