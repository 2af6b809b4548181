//! Filesystem helpers shared across the crate.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Create a directory and all missing parents, with a readable error.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("create directory: {}", path.display()))
}

/// Copy a file, creating the target's parent directories as needed.
pub fn copy_file(source: &Path, target: &Path) -> Result<()> {
    let data =
        fs::read(source).with_context(|| format!("read file: {}", source.display()))?;
    if let Some(parent) = target.parent() {
        ensure_dir(parent)?;
    }
    fs::write(target, data).with_context(|| format!("write file: {}", target.display()))
}

/// Locate the first of `names` on `PATH`.
///
/// On Windows each name is also probed with an `.exe` suffix.
pub fn find_in_path(names: &[&str]) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in names {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
            if cfg!(windows) {
                let mut exe_name = OsString::from(name);
                exe_name.push(".exe");
                let candidate = dir.join(exe_name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}
