//! Retention sweep over old version directories.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Remove `v*` directories beyond the retention count.
///
/// The directory backing `current_version` is never a candidate. Remaining
/// candidates are ranked by modification time, newest first, and everything
/// past `keep_versions` is deleted.
pub fn cleanup_old_versions(app_dir: &Path, current_version: &str, keep_versions: u32) -> Result<()> {
    let entries = fs::read_dir(app_dir)
        .with_context(|| format!("read app directory for cleanup: {}", app_dir.display()))?;

    let current_dir_name = format!("v{current_version}");
    let mut old: Vec<(String, SystemTime)> = Vec::new();
    for entry in entries {
        let entry = entry.context("read app directory entry")?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('v') || name == current_dir_name {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_dir() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        old.push((name, modified));
    }

    let keep = keep_versions as usize;
    if old.len() <= keep {
        return Ok(());
    }
    old.sort_by(|a, b| b.1.cmp(&a.1));
    for (name, _) in old.drain(keep..) {
        let victim = app_dir.join(&name);
        fs::remove_dir_all(&victim)
            .with_context(|| format!("remove old version {}", victim.display()))?;
        tracing::debug!("removed old version directory {}", victim.display());
    }
    Ok(())
}
