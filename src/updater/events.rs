//! Append-only structured event log, one file per UTC day per app.
//!
//! Every stage boundary of an update transaction emits one record. Writes
//! are strictly best-effort: a transaction must never fail because its audit
//! trail could not be written, so all I/O errors end up as `tracing::debug`
//! noise instead of propagating.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// One line of the per-app event log.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    /// App the transaction operates on.
    pub app: String,
    /// Coarse stage name (`download`, `verify`, `switch`, ...).
    pub stage: String,
    /// Event name from the stable taxonomy (`PKG_DOWNLOAD_DONE`, ...).
    pub event: String,
    /// Taxonomy tag, present on `*_FAILED` events.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    /// Free-form detail.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Append one record to `logs/events-YYYYMMDD.log` under `app_dir`.
///
/// Failures are swallowed by design; they are only surfaced through the
/// process-level `tracing` output.
pub fn append_event(app_dir: &Path, at: DateTime<Utc>, record: &EventRecord) {
    if let Err(err) = try_append(app_dir, at, record) {
        tracing::debug!("event log write failed: {err:#}");
    }
}

fn try_append(app_dir: &Path, at: DateTime<Utc>, record: &EventRecord) -> anyhow::Result<()> {
    let log_dir = app_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("events-{}.log", at.format("%Y%m%d")));
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(log_path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
