//! Per-file transfer progress drawn with indicatif.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use harvester_core::{DownloadError, TransferObserver};
use indicatif::{ProgressBar, ProgressStyle};

/// Draws one bar per transfer; a spinner when the size is unknown.
pub(crate) struct ProgressObserver {
    enabled: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock()
            && let Some(bar) = guard.as_ref()
        {
            f(bar);
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

fn new_bar(expected_total: Option<u64>) -> ProgressBar {
    match expected_total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .map(|style| style.progress_chars("##-"))
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg} {bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        }
    }
}

impl TransferObserver for ProgressObserver {
    fn on_start(&self, path: &Path, resumed_from: u64, expected_total: Option<u64>) {
        if !self.enabled {
            return;
        }
        let bar = new_bar(expected_total);
        bar.set_position(resumed_from);
        bar.set_message(display_name(path));
        if let Ok(mut guard) = self.bar.lock()
            && let Some(previous) = guard.replace(bar)
        {
            previous.finish_and_clear();
        }
    }

    fn on_progress(&self, bytes: u64) {
        self.with_bar(|bar| bar.inc(bytes));
    }

    fn on_retry(&self, failed_attempt: u32, delay: Duration, _error: &DownloadError) {
        self.with_bar(|bar| {
            bar.set_message(format!("retry {failed_attempt} in {:.1}s", delay.as_secs_f64()));
        });
    }

    fn on_finish(&self, _path: &Path) {
        if let Ok(mut guard) = self.bar.lock()
            && let Some(bar) = guard.take()
        {
            bar.finish_and_clear();
        }
    }
}
