//! Single-writer cross-process lock per app.
//!
//! The lock is an exclusive-create file carrying `{pid, created_at}` as
//! JSON. Acquisition must observe create-exclusive semantics so two
//! processes racing for the same app cannot both win. A holder that died
//! without unlinking is detected through its recorded PID and recovered
//! exactly once per acquisition attempt.
//!
//! Empty or malformed lock content is deliberately treated as ACTIVE: a
//! concurrent writer may have created the file but not yet flushed its
//! metadata, and trampling it would break mutual exclusion.

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    created_at: String,
}

/// Guard object holding the per-app update lock.
///
/// The lock file is unlinked when the guard is dropped, which covers every
/// exit path of the transaction including unwinding panics.
#[derive(Debug)]
pub struct AppLock {
    path: PathBuf,
}

impl AppLock {
    /// Acquire the lock at `lock_path`.
    ///
    /// On conflict the existing file is read and its recorded PID probed
    /// with `pid_alive`; a dead holder is removed and the exclusive create
    /// retried once. A live (or undecidable) holder yields an
    /// `update already running` error.
    pub fn acquire<F>(lock_path: &Path, pid_alive: F) -> Result<Self>
    where
        F: Fn(u32) -> bool,
    {
        match try_create(lock_path) {
            Ok(()) => return Ok(Self { path: lock_path.to_path_buf() }),
            Err(err) if !is_already_exists(&err) => return Err(err),
            Err(_) => {}
        }
        if !lock_is_stale(lock_path, &pid_alive) {
            return Err(anyhow!("update already running"));
        }
        let _ = fs::remove_file(lock_path);
        match try_create(lock_path) {
            Ok(()) => Ok(Self { path: lock_path.to_path_buf() }),
            Err(err) if is_already_exists(&err) => Err(anyhow!("update already running")),
            Err(err) => Err(err),
        }
    }

    /// Path of the held lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AppLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to release lock {}: {err}", self.path.display());
            }
        }
    }
}

fn try_create(lock_path: &Path) -> Result<()> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create lock dir: {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
        .with_context(|| format!("acquire lock: {}", lock_path.display()))?;
    let info = LockInfo {
        pid: std::process::id(),
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    let payload = serde_json::to_vec(&info).context("encode lock info")?;
    file.write_all(&payload).context("write lock info")?;
    Ok(())
}

fn is_already_exists(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::AlreadyExists)
}

/// Whether the lock file at `lock_path` belongs to a dead holder.
///
/// Any doubt (unreadable file, empty or malformed content, zero PID,
/// probe failure) resolves to "active".
fn lock_is_stale<F>(lock_path: &Path, pid_alive: &F) -> bool
where
    F: Fn(u32) -> bool,
{
    let raw = match fs::read_to_string(lock_path) {
        Ok(raw) => raw,
        Err(err) => return err.kind() == std::io::ErrorKind::NotFound,
    };
    if raw.trim().is_empty() {
        return false;
    }
    let info: LockInfo = match serde_json::from_str(&raw) {
        Ok(info) => info,
        Err(_) => return false,
    };
    if info.pid == 0 {
        return false;
    }
    !pid_alive(info.pid)
}
