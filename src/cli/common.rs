//! Shared command plumbing: resolved workspace context and manager
//! construction.

use crate::config::{Config, OutputLevel};
use crate::updater::UpdateManager;
use crate::utils::progress::CliReporter;
use crate::workspace;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Per-update behavior toggles passed through from command flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateFlags {
    /// Run version discovery before resolving the artifact.
    pub checkver: bool,
    /// Ask for confirmation before the switch stage.
    pub prompt_switch: bool,
    /// Relaunch the binary after a successful switch.
    pub relaunch: bool,
}

/// Everything a command needs: the resolved root, loaded config, and the
/// output reporter.
pub struct CommandContext {
    /// Resolved workspace root.
    pub root: PathBuf,
    /// Path of the running executable (used by layout inspection).
    pub executable: PathBuf,
    /// Decoded workspace configuration.
    pub config: Config,
    /// Terminal renderer for messages and download progress.
    pub reporter: CliReporter,
}

impl CommandContext {
    /// Resolve root, config, and output level from flags and environment.
    pub fn resolve(
        flag_root: Option<&Path>,
        verbose: bool,
        quiet: bool,
        no_progress: bool,
    ) -> Result<Self> {
        let executable = std::env::current_exe().context("resolve executable path")?;
        let root = workspace::resolve_root(flag_root, &executable)?;
        let config = Config::load(&root)?;
        let level = if quiet {
            OutputLevel::Silent
        } else if verbose {
            OutputLevel::Debug
        } else {
            config.output_level
        };
        Ok(Self {
            root,
            executable,
            config,
            reporter: CliReporter::new(level, no_progress),
        })
    }

    /// Repair or reject the workspace layout before a command touches it.
    pub fn ensure_ready(&self) -> Result<()> {
        workspace::ensure_ready(&self.root, &self.executable)
    }

    /// Build an update manager wired to this context's config and
    /// reporter.
    pub fn manager(&self, flags: &UpdateFlags) -> UpdateManager {
        UpdateManager::new(&self.root)
            .keep_versions(self.config.keep_versions)
            .use_checkver(flags.checkver)
            .prompt_switch(flags.prompt_switch)
            .relaunch(flags.relaunch)
            .on_message(self.reporter.message_hook())
            .on_progress(self.reporter.progress_hook())
    }

    /// Path of the registered manifest for `app`.
    pub fn manifest_path(&self, app: &str) -> PathBuf {
        self.root.join("manifests").join(format!("{app}.json"))
    }

    /// Path of the `current` pointer for `app`.
    pub fn current_path(&self, app: &str) -> PathBuf {
        self.root.join("apps").join(app).join("current")
    }
}

/// Derive the app name from a manifest file path: the `.json` stem.
pub fn derive_app_name(path: &Path) -> Result<String> {
    let extension_ok = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if !extension_ok {
        bail!("manifest file must end with .json: {}", path.display());
    }
    let app = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().trim().to_string())
        .unwrap_or_default();
    if app.is_empty() {
        bail!("cannot derive app name from manifest file: {}", path.display());
    }
    Ok(app)
}
