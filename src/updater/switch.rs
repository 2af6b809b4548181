//! Atomic retargeting of an app's `current` pointer.
//!
//! `current` is preferably a directory junction (Windows) or symlink; where
//! link creation is unavailable or fails, it degrades to a plain directory
//! holding a single marker file whose contents name the absolute target.
//! Readers must accept both forms, trying link resolution first and the
//! marker second.

use crate::constants::CURRENT_MARKER_FILE;
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Point `current_path` at `target`, replacing whatever was there.
pub fn switch_current(current_path: &Path, target: &Path) -> Result<()> {
    switch_current_with(current_path, target, create_link)
}

/// Re-point `current_path` at the previously recorded target.
///
/// A transaction that never had a previous target (first install) has
/// nothing to restore.
pub fn rollback_current(current_path: &Path, prev_target: Option<&Path>) -> Result<()> {
    match prev_target {
        Some(prev) => switch_current(current_path, prev),
        None => Ok(()),
    }
}

/// Resolve the target a `current` pointer names, or `None` when no pointer
/// exists yet. Link resolution is tried first, then the marker file; marker
/// contents have trailing whitespace ignored.
pub fn resolve_current_target(current_path: &Path) -> Result<Option<PathBuf>> {
    if let Ok(link) = fs::read_link(current_path) {
        return Ok(Some(link));
    }
    let marker = current_path.join(CURRENT_MARKER_FILE);
    match fs::read_to_string(&marker) {
        Ok(raw) => Ok(Some(PathBuf::from(raw.trim_end()))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("read current marker: {}", marker.display()))
        }
    }
}

fn switch_current_with<F>(current_path: &Path, target: &Path, link: F) -> Result<()>
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    remove_pointer(current_path)?;

    if link(current_path, target).is_ok() {
        return Ok(());
    }

    // Marker-directory fallback for platforms or filesystems where link
    // creation is unavailable.
    fs::create_dir_all(current_path)
        .with_context(|| format!("create current dir: {}", current_path.display()))?;
    let marker = current_path.join(CURRENT_MARKER_FILE);
    fs::write(&marker, target.as_os_str().as_encoded_bytes())
        .with_context(|| format!("write current marker: {}", marker.display()))
}

/// Remove an existing `current` pointer without following it.
fn remove_pointer(current_path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(current_path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("stat current: {}", current_path.display()));
        }
    };
    let result = if meta.file_type().is_symlink() {
        remove_link(current_path)
    } else if meta.is_dir() {
        fs::remove_dir_all(current_path)
    } else {
        fs::remove_file(current_path)
    };
    result.with_context(|| format!("remove current: {}", current_path.display()))
}

#[cfg(unix)]
fn remove_link(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

#[cfg(windows)]
fn remove_link(path: &Path) -> io::Result<()> {
    // Directory junctions and directory symlinks unlink as directories.
    fs::remove_dir(path).or_else(|_| fs::remove_file(path))
}

#[cfg(unix)]
fn create_link(current_path: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = current_path.parent() {
        fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(target, current_path)
}

#[cfg(windows)]
fn create_link(current_path: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = current_path.parent() {
        fs::create_dir_all(parent)?;
    }
    // Junctions do not require elevated privileges, unlike symlinks.
    let output = std::process::Command::new("cmd")
        .args(["/c", "mklink", "/J"])
        .arg(current_path)
        .arg(target)
        .output()?;
    if !output.status.success() {
        return Err(io::Error::other(format!(
            "mklink junction failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn switch_and_resolve_round_trip() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("v1.37.0-1");
        fs::create_dir_all(&target).unwrap();
        let current = dir.path().join("current");

        switch_current(&current, &target).unwrap();
        assert_eq!(resolve_current_target(&current).unwrap(), Some(target));
    }

    #[test]
    fn switch_replaces_existing_pointer() {
        let dir = TempDir::new().unwrap();
        let v1 = dir.path().join("v1");
        let v2 = dir.path().join("v2");
        fs::create_dir_all(&v1).unwrap();
        fs::create_dir_all(&v2).unwrap();
        let current = dir.path().join("current");

        switch_current(&current, &v1).unwrap();
        switch_current(&current, &v2).unwrap();
        assert_eq!(resolve_current_target(&current).unwrap(), Some(v2));
        // The old target itself is untouched.
        assert!(v1.exists());
    }

    #[test]
    fn falls_back_to_marker_when_link_creation_fails() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("v1");
        fs::create_dir_all(&target).unwrap();
        let current = dir.path().join("current");

        switch_current_with(&current, &target, |_, _| {
            Err(io::Error::other("force fallback"))
        })
        .unwrap();

        let marker = current.join(CURRENT_MARKER_FILE);
        assert!(marker.exists());
        assert_eq!(resolve_current_target(&current).unwrap(), Some(target));
    }

    #[test]
    fn marker_contents_ignore_trailing_whitespace() {
        let dir = TempDir::new().unwrap();
        let current = dir.path().join("current");
        fs::create_dir_all(&current).unwrap();
        fs::write(current.join(CURRENT_MARKER_FILE), "/apps/demo/v1\n").unwrap();

        assert_eq!(
            resolve_current_target(&current).unwrap(),
            Some(PathBuf::from("/apps/demo/v1"))
        );
    }

    #[test]
    fn missing_pointer_resolves_to_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_current_target(&dir.path().join("current")).unwrap(), None);
    }

    #[test]
    fn rollback_without_previous_target_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        rollback_current(&dir.path().join("current"), None).unwrap();
        assert!(!dir.path().join("current").exists());
    }
}
