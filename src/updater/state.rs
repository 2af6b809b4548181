//! Durable per-app runtime state (`runtime.json`).
//!
//! The state file is an index over the filesystem, not the source of truth:
//! the `current` pointer is authoritative. A missing file decodes to the
//! zero-value state so that a freshly added app and a crashed-mid-bootstrap
//! app look the same to the engine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Persistent install status of one app.
///
/// Invariants maintained by the update transaction:
/// - `current_version` changes only on a successful switch.
/// - `pending_version` is set while staging is committed and cleared at
///   every terminal state, success or failure.
/// - `last_error_code` is always one of the canonical taxonomy tags when
///   non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeState {
    /// Version currently materialized behind `current`, or empty.
    #[serde(default)]
    pub current_version: String,

    /// RFC 3339 UTC timestamp of the last update attempt.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_check_at: String,

    /// RFC 3339 UTC timestamp of the last successful switch.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_update_at: String,

    /// Taxonomy tag of the last failure, or empty after a success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_error_code: String,

    /// Human-readable cause of the last failure.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_error_message: String,

    /// Version being staged by an in-flight transaction, or empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pending_version: String,
}

/// Read the runtime state, treating a missing file as the zero value.
pub fn load_state(path: &Path) -> Result<RuntimeState> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(RuntimeState::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read runtime state: {}", path.display()));
        }
    };
    serde_json::from_slice(&bytes)
        .with_context(|| format!("decode runtime state: {}", path.display()))
}

/// Persist the runtime state as indented JSON, creating parent directories.
pub fn save_state(path: &Path, state: &RuntimeState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create state dir: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(state).context("encode runtime state")?;
    fs::write(path, json).with_context(|| format!("write runtime state: {}", path.display()))
}
