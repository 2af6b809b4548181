//! Structured progress and message reporting.
//!
//! The update engine never prints; it emits structured events through the
//! hooks defined here, and the CLI decides how to render them. Hooks must be
//! non-blocking — the [`CliReporter`] only touches in-memory indicatif
//! state and buffered terminal writes.

use crate::config::OutputLevel;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};

/// Severity of a message emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    /// Normal operator-facing status line.
    Default,
    /// Detail shown only in debug output.
    Debug,
}

/// Snapshot of an in-flight download.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    /// App the artifact belongs to.
    pub app: String,
    /// Bytes written so far.
    pub downloaded: u64,
    /// Total size when the server announced one.
    pub total: Option<u64>,
    /// Set on the final notification.
    pub done: bool,
}

/// Non-blocking message callback.
pub type MessageHook = Arc<dyn Fn(MessageLevel, &str) + Send + Sync>;

/// Non-blocking download-progress callback.
pub type ProgressHook = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Terminal renderer wiring engine hooks to colored status lines and an
/// indicatif byte-progress bar.
#[derive(Clone)]
pub struct CliReporter {
    level: OutputLevel,
    progress_enabled: bool,
    bar: Arc<Mutex<Option<ProgressBar>>>,
}

impl CliReporter {
    /// Build a reporter for the given output level; `no_progress` disables
    /// the animated bar (useful for CI logs and pipes).
    pub fn new(level: OutputLevel, no_progress: bool) -> Self {
        Self {
            level,
            progress_enabled: !no_progress,
            bar: Arc::new(Mutex::new(None)),
        }
    }

    /// Print an operator-facing status line, honoring the output level.
    pub fn message(&self, level: MessageLevel, text: &str) {
        match self.level {
            OutputLevel::Silent => return,
            OutputLevel::Default if level == MessageLevel::Debug => return,
            _ => {}
        }
        self.clear_bar();
        match level {
            MessageLevel::Debug => println!("{}", format!("[dbg] {text}").cyan()),
            MessageLevel::Default => {
                if text.starts_with("[ok]") {
                    println!("{}", text.green());
                } else {
                    println!("{text}");
                }
            }
        }
    }

    /// Print an error line to stderr; errors are never silenced.
    pub fn error(&self, text: &str) {
        self.clear_bar();
        eprintln!("{}", format!("[err] {text}").red());
    }

    /// Render a download-progress snapshot.
    pub fn progress(&self, progress: &DownloadProgress) {
        if !self.progress_enabled || self.level == OutputLevel::Silent {
            return;
        }
        let mut slot = self.bar.lock().unwrap();
        if progress.done {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
            return;
        }
        let bar = slot.get_or_insert_with(|| {
            let bar = match progress.total {
                Some(total) => {
                    let bar = ProgressBar::new(total);
                    bar.set_style(
                        ProgressStyle::with_template(
                            "{prefix} [{bar:24}] {bytes}/{total_bytes}",
                        )
                        .unwrap()
                        .progress_chars("=. "),
                    );
                    bar
                }
                None => {
                    let bar = ProgressBar::new_spinner();
                    bar.set_style(
                        ProgressStyle::with_template("{prefix} {bytes}").unwrap(),
                    );
                    bar
                }
            };
            bar.set_prefix(format!("downloading {}", progress.app));
            bar
        });
        bar.set_position(progress.downloaded);
    }

    /// Message hook adapter for the update engine.
    pub fn message_hook(&self) -> MessageHook {
        let reporter = self.clone();
        Arc::new(move |level: MessageLevel, text: &str| reporter.message(level, text))
    }

    /// Progress hook adapter for the update engine.
    pub fn progress_hook(&self) -> ProgressHook {
        let reporter = self.clone();
        Arc::new(move |progress: &DownloadProgress| reporter.progress(progress))
    }

    fn clear_bar(&self) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}
