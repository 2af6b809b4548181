//! Workspace root resolution and directory-layout bootstrap.
//!
//! A workspace root holds everything the launcher manages:
//!
//! ```text
//! <root>/
//!   config.toml     — workspace configuration
//!   manifests/      — one <app>.json per registered app
//!   shims/          — launcher shims
//!   scripts/        — shared PowerShell modules for pre-install hooks
//!   apps/<app>/     — versioned installs, current pointer, runtime state
//! ```
//!
//! Root resolution precedence: explicit `--root` flag, then the
//! `APPSTRACT_HOME` environment variable, then the directory containing
//! the running executable (the portable-deployment default), then the
//! working directory.

use crate::constants::ENV_HOME;
use crate::utils::fs::ensure_dir;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Directories every initialized workspace carries.
pub const REQUIRED_DIRS: [&str; 4] = ["manifests", "shims", "scripts", "apps"];

/// Default configuration written by `init` when none exists.
pub const DEFAULT_CONFIG_TOML: &str = "\
# Appstract workspace configuration.

# Old version directories retained per app after a successful update.
keep_versions = 2

# CLI verbosity: \"silent\", \"default\" or \"debug\".
output_level = \"default\"
";

/// Findings of a layout inspection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LayoutState {
    /// All required directories exist.
    pub complete: bool,
    /// Required directories that are missing (or are plain files).
    pub missing_dirs: Vec<String>,
    /// The root holds nothing but the launcher binary itself — a virgin
    /// deployment that should go through `init` rather than silent repair.
    pub binary_only: bool,
    /// The root directory does not exist at all.
    pub root_not_exists: bool,
}

/// Resolve the workspace root from flag, environment, and executable
/// location.
pub fn resolve_root(flag_root: Option<&Path>, executable_path: &Path) -> Result<PathBuf> {
    if let Some(root) = flag_root {
        return Ok(root.to_path_buf());
    }
    if let Some(env_home) = std::env::var_os(ENV_HOME) {
        if !env_home.is_empty() {
            return Ok(PathBuf::from(env_home));
        }
    }
    if let Some(dir) = executable_path.parent() {
        if !dir.as_os_str().is_empty() {
            return Ok(dir.to_path_buf());
        }
    }
    std::env::current_dir().context("resolve current working directory")
}

/// Create the full workspace layout and a default `config.toml`.
///
/// Idempotent: existing directories and an existing config file are left
/// untouched.
pub fn init_layout(root: &Path) -> Result<()> {
    if root.as_os_str().is_empty() {
        bail!("root cannot be empty");
    }
    ensure_dir(root)?;
    for dir in REQUIRED_DIRS {
        ensure_dir(&root.join(dir))?;
    }
    let config_path = root.join("config.toml");
    if !config_path.exists() {
        std::fs::write(&config_path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("write config: {}", config_path.display()))?;
    }
    Ok(())
}

/// Inspect how much of the layout exists under `root`.
pub fn inspect_layout(root: &Path, executable_path: &Path) -> Result<LayoutState> {
    let mut state = LayoutState::default();
    if root.as_os_str().is_empty() {
        bail!("root cannot be empty");
    }
    match std::fs::metadata(root) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            state.root_not_exists = true;
            state.missing_dirs = REQUIRED_DIRS.iter().map(|d| d.to_string()).collect();
            return Ok(state);
        }
        Err(err) => {
            return Err(err).with_context(|| format!("stat root: {}", root.display()));
        }
        Ok(meta) if !meta.is_dir() => bail!("root is not a directory: {}", root.display()),
        Ok(_) => {}
    }

    for dir in REQUIRED_DIRS {
        let dir_path = root.join(dir);
        match std::fs::metadata(&dir_path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => state.missing_dirs.push(dir.to_string()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                state.missing_dirs.push(dir.to_string());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("stat required directory: {}", dir_path.display()));
            }
        }
    }
    if state.missing_dirs.is_empty() {
        state.complete = true;
        return Ok(state);
    }

    let entries = std::fs::read_dir(root)
        .with_context(|| format!("read root directory: {}", root.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .context("read root directory entries")?;
    state.binary_only = is_empty_or_binary_only(&entries, executable_path);
    Ok(state)
}

/// Create the named missing directories.
pub fn repair_layout(root: &Path, missing_dirs: &[String]) -> Result<()> {
    if root.as_os_str().is_empty() {
        bail!("root cannot be empty");
    }
    if missing_dirs.is_empty() {
        return Ok(());
    }
    ensure_dir(root)?;
    for dir in missing_dirs {
        ensure_dir(&root.join(dir))?;
    }
    Ok(())
}

/// Make sure the workspace is usable before a command runs.
///
/// A complete layout passes; a partially initialized one is silently
/// repaired; a virgin root (empty, or holding only the launcher binary)
/// demands an explicit `init` so commands never scatter directories into
/// an unintended location.
pub fn ensure_ready(root: &Path, executable_path: &Path) -> Result<()> {
    let state = inspect_layout(root, executable_path)?;
    if state.complete {
        return Ok(());
    }
    if state.binary_only {
        bail!(
            "workspace not initialized at {}, please run: appstract init --root {}",
            root.display(),
            root.display()
        );
    }
    repair_layout(root, &state.missing_dirs)
}

fn is_empty_or_binary_only(entries: &[std::fs::DirEntry], executable_path: &Path) -> bool {
    if entries.is_empty() {
        return true;
    }
    let exe_name = executable_path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if exe_name.is_empty() {
        return false;
    }
    entries.iter().all(|entry| {
        !entry.path().is_dir() && entry.file_name().to_string_lossy().to_lowercase() == exe_name
    })
}
