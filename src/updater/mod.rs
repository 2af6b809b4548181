//! The update transaction engine.
//!
//! An update transaction takes a manifest plus whatever is currently on
//! disk and drives a crash-safe pipeline: optional version discovery →
//! download → SHA-256 verification → extraction → pre-install hooks →
//! process termination → atomic `current` switch → health check → rollback
//! on failure → old-version garbage collection. The whole pipeline runs
//! under a single-writer per-app lock and journals every stage boundary to
//! a per-day event log.
//!
//! # Transaction shape
//!
//! Stages execute strictly in order, each with a canonical failure tag
//! (see [`ErrorCode`]):
//!
//! 1. resolve (after optional discovery) — `MANIFEST_INCOMPLETE`
//! 2. lock — `ALREADY_RUNNING`
//! 3. load state, stamp `last_check_at`
//! 4. fast path when already at the requested version
//! 5. staging prep, `pending_version` persisted
//! 6. download — `PKG_DOWNLOAD`
//! 7. verify — `PKG_VERIFY`
//! 8. extract + source-dir resolution — `PKG_EXTRACT`
//! 9. pre-install hooks — `SCRIPT_PREINSTALL`
//! 10. version-dir commit
//! 11. optional switch confirmation — `SWITCH_PROMPT`
//! 12. process stop — `SWITCH_PROCESS`
//! 13. pointer switch — `SWITCH_CURRENT`
//! 14. health check (+ optional relaunch) — `SWITCH_HEALTHCHECK`, with
//!     rollback to the previous target; a failing rollback composes both
//!     causes under `SWITCH_ROLLBACK`
//! 15. finalize: state, GC, staging removal
//!
//! Failures persist `last_error_code`/`last_error_message` and clear
//! `pending_version` before returning (once the lock is held — earlier
//! failures must not touch state another writer may own). Rollback runs
//! only on health-check failure; every pre-switch failure leaves the
//! previous `current` untouched.
//!
//! # Ownership
//!
//! Each transaction runs on one logical thread of control; there is no
//! internal parallelism. The app subtree belongs to the lock holder, the
//! event log tolerates concurrent best-effort writers, and `current` is
//! modified only inside the switch stage.

pub mod checkver;
pub mod download;
pub mod error;
pub mod events;
pub mod extract;
pub mod gc;
pub mod lock;
pub mod process;
pub mod script;
pub mod state;
pub mod switch;
pub mod verify;

#[cfg(test)]
mod tests;

pub use error::{ErrorCode, UpdateError};
pub use state::RuntimeState;

use crate::constants::{
    DEFAULT_GITHUB_API_BASE, DEFAULT_HTTP_TIMEOUT, DEFAULT_KEEP_VERSIONS, DEFAULT_SCRIPT_TIMEOUT,
    DEFAULT_STOP_TIMEOUT, PROCESS_POLL_INTERVAL, STAGING_ARCHIVE_NAME,
};
use crate::manifest::Manifest;
use crate::utils::progress::{MessageHook, MessageLevel, ProgressHook};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

type FindPidsFn = Box<dyn Fn(&Path) -> Result<Vec<u32>> + Send + Sync>;
type ClosePidFn = Box<dyn Fn(u32) -> Result<()> + Send + Sync>;
type KillPidFn = Box<dyn Fn(u32, bool) -> Result<()> + Send + Sync>;
type LaunchFn = Box<dyn Fn(&Path) -> Result<()> + Send + Sync>;
type ConfirmFn = Box<dyn Fn(&str, &str) -> Result<bool> + Send + Sync>;
type PidAliveFn = Box<dyn Fn(u32) -> bool + Send + Sync>;

/// Drives update transactions for apps under one workspace root.
///
/// Construction uses builder-style setters; unspecified knobs keep their
/// production defaults. External effects (process enumeration and kills,
/// detached launches, interactive confirmation) run through injectable
/// function seams so the transaction can be exercised hermetically.
pub struct UpdateManager {
    root: PathBuf,
    now: fn() -> DateTime<Utc>,
    use_checkver: bool,
    github_api_base: String,
    script_timeout: Duration,
    keep_versions: u32,
    prompt_switch: bool,
    relaunch: bool,
    stop_timeout: Duration,
    require_https: bool,
    on_message: Option<MessageHook>,
    on_progress: Option<ProgressHook>,
    find_pids: FindPidsFn,
    close_pid: ClosePidFn,
    kill_pid: KillPidFn,
    launch: LaunchFn,
    confirm: ConfirmFn,
    pid_alive: PidAliveFn,
}

impl UpdateManager {
    /// Create a manager rooted at `root` with production defaults.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            now: Utc::now,
            use_checkver: false,
            github_api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
            keep_versions: DEFAULT_KEEP_VERSIONS,
            prompt_switch: false,
            relaunch: false,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            require_https: true,
            on_message: None,
            on_progress: None,
            find_pids: Box::new(process::find_pids_by_prefix),
            close_pid: Box::new(process::graceful_close),
            kill_pid: Box::new(process::kill_pid),
            launch: Box::new(process::launch_detached),
            confirm: Box::new(terminal_confirm),
            pid_alive: Box::new(process::pid_alive),
        }
    }

    /// Enable version discovery before resolving the artifact.
    pub fn use_checkver(mut self, enabled: bool) -> Self {
        self.use_checkver = enabled;
        self
    }

    /// Require interactive confirmation before the switch stage.
    pub fn prompt_switch(mut self, enabled: bool) -> Self {
        self.prompt_switch = enabled;
        self
    }

    /// Relaunch the app binary after a successful switch.
    pub fn relaunch(mut self, enabled: bool) -> Self {
        self.relaunch = enabled;
        self
    }

    /// Old version directories retained by garbage collection.
    pub fn keep_versions(mut self, keep: u32) -> Self {
        self.keep_versions = keep;
        self
    }

    /// Hard timeout for the combined pre-install script.
    pub fn script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    /// Deadline before the process supervisor escalates to forced kills.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Override the GitHub API base queried by discovery.
    pub fn github_api_base(mut self, base: impl Into<String>) -> Self {
        self.github_api_base = base.into();
        self
    }

    /// Relax the HTTPS-only download policy. Test seam; production callers
    /// never disable this.
    pub fn require_https(mut self, required: bool) -> Self {
        self.require_https = required;
        self
    }

    /// Install a message hook for operator-facing status lines.
    pub fn on_message(mut self, hook: MessageHook) -> Self {
        self.on_message = Some(hook);
        self
    }

    /// Install a download-progress hook.
    pub fn on_progress(mut self, hook: ProgressHook) -> Self {
        self.on_progress = Some(hook);
        self
    }

    /// Replace the switch-confirmation collaborator.
    pub fn with_confirm<F>(mut self, confirm: F) -> Self
    where
        F: Fn(&str, &str) -> Result<bool> + Send + Sync + 'static,
    {
        self.confirm = Box::new(confirm);
        self
    }

    /// Replace the detached-launch collaborator used by relaunch.
    pub fn with_launcher<F>(mut self, launch: F) -> Self
    where
        F: Fn(&Path) -> Result<()> + Send + Sync + 'static,
    {
        self.launch = Box::new(launch);
        self
    }

    /// Workspace root this manager operates under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parse a manifest file and run the update transaction for `app`.
    pub async fn update_from_manifest(
        &self,
        app: &str,
        manifest_path: &Path,
    ) -> Result<(), UpdateError> {
        let manifest = Manifest::parse_file(manifest_path)
            .map_err(|err| UpdateError::tagged(ErrorCode::ManifestIncomplete, format!("{err:#}")))?;
        self.update(app, &manifest).await
    }

    /// Run one update transaction for `app` against `manifest`.
    ///
    /// Returns the single error value for the transaction; see the module
    /// documentation for the stage and failure-tag contract.
    pub async fn update(&self, app: &str, manifest: &Manifest) -> Result<(), UpdateError> {
        if app.is_empty() {
            return Err(UpdateError::tagged(
                ErrorCode::ManifestIncomplete,
                "app name is required",
            ));
        }

        let mut effective = manifest.clone();
        let client = self.http_client()?;
        if self.use_checkver {
            self.message(
                MessageLevel::Debug,
                &format!("resolving latest version for {app}"),
            );
            checkver::apply_checkver(&client, &self.github_api_base, &mut effective).await?;
        }
        let artifact = effective
            .resolve_artifact_64()
            .map_err(|err| UpdateError::tagged(ErrorCode::ManifestIncomplete, format!("{err:#}")))?;

        let app_dir = self.app_dir(app);
        self.emit(app, "update", "UPDATE_BEGIN", None, "update transaction started");

        let _lock = lock::AppLock::acquire(&app_dir.join(".lock"), |pid| (self.pid_alive)(pid))
            .map_err(|err| UpdateError::tagged(ErrorCode::AlreadyRunning, format!("{err:#}")))?;

        let state_path = app_dir.join("runtime.json");
        let mut state = state::load_state(&state_path)?;
        state.last_check_at = self.timestamp();

        if !state.current_version.is_empty() && state.current_version == effective.version {
            state.pending_version.clear();
            state::save_state(&state_path, &state)?;
            gc::cleanup_old_versions(&app_dir, &effective.version, self.keep_versions)?;
            self.emit(app, "update", "UPDATE_DONE", None, "already at requested version");
            self.message(
                MessageLevel::Default,
                &format!("{app} already at version {}", effective.version),
            );
            return Ok(());
        }

        let staging = app_dir.join("_staging").join(format!("v{}", effective.version));
        let version_dir = app_dir.join(format!("v{}", effective.version));
        remove_dir_all_if_exists(&staging).context("cleanup old staging")?;
        std::fs::create_dir_all(&staging).context("create staging")?;

        state.pending_version = effective.version.clone();
        state::save_state(&state_path, &state)?;

        let archive_path = staging.join(STAGING_ARCHIVE_NAME);
        self.emit(app, "download", "PKG_DOWNLOAD_BEGIN", None, &artifact.url);
        self.message(
            MessageLevel::Default,
            &format!("downloading {app} {}", effective.version),
        );
        if let Err(err) = download::download_file(
            &client,
            &artifact.url,
            &archive_path,
            self.require_https,
            app,
            self.on_progress.as_ref(),
        )
        .await
        {
            return Err(self.fail(
                app,
                &state_path,
                &mut state,
                ErrorCode::PkgDownload,
                "download",
                "PKG_DOWNLOAD_FAILED",
                err,
            ));
        }
        self.emit(
            app,
            "download",
            "PKG_DOWNLOAD_DONE",
            None,
            &archive_path.display().to_string(),
        );

        self.message(MessageLevel::Debug, "verifying package digest");
        if let Err(err) = verify::verify_sha256(&archive_path, &artifact.hash) {
            return Err(self.fail(
                app,
                &state_path,
                &mut state,
                ErrorCode::PkgVerify,
                "verify",
                "PKG_VERIFY_FAILED",
                err,
            ));
        }
        self.emit(app, "verify", "PKG_VERIFY_DONE", None, "sha256 verified");

        let extracted_root = staging.join("extracted");
        self.message(MessageLevel::Debug, "extracting package");
        if let Err(err) = extract::extract_zip(&archive_path, &extracted_root) {
            return Err(self.fail(
                app,
                &state_path,
                &mut state,
                ErrorCode::PkgExtract,
                "extract",
                "PKG_EXTRACT_FAILED",
                err,
            ));
        }
        self.emit(
            app,
            "extract",
            "PKG_EXTRACT_DONE",
            None,
            &extracted_root.display().to_string(),
        );

        let source_dir = if artifact.extract_dir.is_empty() {
            extracted_root.clone()
        } else {
            extracted_root.join(&artifact.extract_dir)
        };
        if !source_dir.is_dir() {
            return Err(self.fail(
                app,
                &state_path,
                &mut state,
                ErrorCode::PkgExtract,
                "extract",
                "PKG_EXTRACT_FAILED",
                anyhow::anyhow!("source extract directory missing: {}", source_dir.display()),
            ));
        }

        self.emit(
            app,
            "script",
            "SCRIPT_PREINSTALL_BEGIN",
            None,
            "running pre_install hooks",
        );
        if let Err(err) = script::run_pre_install(
            &self.root,
            app,
            &source_dir,
            &effective.pre_install,
            self.script_timeout,
            (self.now)(),
        )
        .await
        {
            return Err(self.fail(
                app,
                &state_path,
                &mut state,
                ErrorCode::ScriptPreinstall,
                "script",
                "SCRIPT_PREINSTALL_FAILED",
                err,
            ));
        }
        self.emit(app, "script", "SCRIPT_PREINSTALL_DONE", None, "pre_install completed");

        // Materialize the version directory. A stale directory from an
        // aborted run is removed first; the rename itself is the commit
        // point for the staged payload.
        if let Err(err) = remove_dir_all_if_exists(&version_dir) {
            return Err(self.fail(
                app,
                &state_path,
                &mut state,
                ErrorCode::PkgExtract,
                "extract",
                "PKG_EXTRACT_FAILED",
                anyhow::Error::new(err).context("cleanup version dir"),
            ));
        }
        if let Err(err) = std::fs::rename(&source_dir, &version_dir) {
            return Err(self.fail(
                app,
                &state_path,
                &mut state,
                ErrorCode::PkgExtract,
                "extract",
                "PKG_EXTRACT_FAILED",
                anyhow::Error::new(err).context("move extracted version"),
            ));
        }

        let current_path = app_dir.join("current");
        let prev_target = switch::resolve_current_target(&current_path).unwrap_or(None);

        if self.prompt_switch {
            match (self.confirm)(app, &effective.version) {
                Err(err) => {
                    return Err(self.fail(
                        app,
                        &state_path,
                        &mut state,
                        ErrorCode::SwitchPrompt,
                        "switch",
                        "SWITCH_PROMPT_FAILED",
                        err,
                    ));
                }
                Ok(false) => {
                    state.pending_version.clear();
                    self.emit(
                        app,
                        "switch",
                        "SWITCH_USER_DECLINED",
                        None,
                        "user declined immediate switch",
                    );
                    state::save_state(&state_path, &state)?;
                    self.emit(app, "update", "UPDATE_DONE", None, "user declined switch");
                    return Ok(());
                }
                Ok(true) => {}
            }
        }

        self.emit(
            app,
            "switch",
            "SWITCH_PROCESS_BEGIN",
            None,
            "begin process stop for current path",
        );
        if let Err(err) = self.terminate_processes(app, &current_path).await {
            return Err(self.fail(
                app,
                &state_path,
                &mut state,
                ErrorCode::SwitchProcess,
                "switch",
                "SWITCH_PROCESS_FAILED",
                err,
            ));
        }
        self.emit(app, "switch", "SWITCH_PROCESS_DONE", None, "target processes stopped");

        self.message(
            MessageLevel::Default,
            &format!("switching {app} to {}", effective.version),
        );
        if let Err(err) = switch::switch_current(&current_path, &version_dir) {
            return Err(self.fail(
                app,
                &state_path,
                &mut state,
                ErrorCode::SwitchCurrent,
                "switch",
                "SWITCH_CURRENT_FAILED",
                err,
            ));
        }
        self.emit(app, "switch", "SWITCH_CURRENT_DONE", None, "current version switched");

        if let Err(err) = self.healthcheck_and_relaunch(&current_path, &effective.bin) {
            return Err(self.rollback_after_healthcheck(
                app,
                &state_path,
                &mut state,
                &current_path,
                prev_target.as_deref(),
                err,
            ));
        }
        self.emit(app, "healthcheck", "SWITCH_HEALTHCHECK_DONE", None, "healthcheck passed");

        state.current_version = effective.version.clone();
        state.pending_version.clear();
        state.last_update_at = self.timestamp();
        state.last_error_code.clear();
        state.last_error_message.clear();
        state::save_state(&state_path, &state)?;
        gc::cleanup_old_versions(&app_dir, &effective.version, self.keep_versions)?;
        self.emit(app, "switch", "SWITCH_DONE", None, "update switch transaction completed");
        self.emit(app, "update", "UPDATE_DONE", None, "update transaction completed");
        remove_dir_all_if_exists(&app_dir.join("_staging")).context("remove staging")?;
        self.message(
            MessageLevel::Default,
            &format!("[ok] {app} updated to {}", effective.version),
        );
        Ok(())
    }

    /// Stop every process running out of the app's `current` path.
    ///
    /// Escalation ladder: graceful main-window close, soft terminate with
    /// descendants, poll until the set is empty or the deadline passes,
    /// then forced kill. A forced kill that still fails aborts the
    /// transaction.
    async fn terminate_processes(&self, app: &str, prefix: &Path) -> Result<()> {
        let pids = (self.find_pids)(prefix)?;
        if pids.is_empty() {
            self.emit(
                app,
                "process",
                "SWITCH_PROCESS_NONE",
                None,
                "no running process matched current path",
            );
            return Ok(());
        }
        self.emit(
            app,
            "process",
            "SWITCH_PROCESS_FOUND",
            None,
            &format!("matched_pids={}", pids.len()),
        );

        for pid in &pids {
            if (self.close_pid)(*pid).is_ok() {
                self.emit(app, "process", "SWITCH_PROCESS_GRACEFUL", None, &format!("pid={pid}"));
            }
        }
        for pid in &pids {
            let _ = (self.kill_pid)(*pid, false);
        }
        self.emit(
            app,
            "process",
            "SWITCH_PROCESS_SOFT_KILL",
            None,
            "sent non-force termination signal",
        );

        let deadline = tokio::time::Instant::now() + self.stop_timeout;
        while tokio::time::Instant::now() < deadline {
            let remain = (self.find_pids)(prefix).context("query remaining processes")?;
            if remain.is_empty() {
                return Ok(());
            }
            tokio::time::sleep(PROCESS_POLL_INTERVAL).await;
        }

        let remain = (self.find_pids)(prefix).context("query remaining processes")?;
        for pid in remain {
            if let Err(err) = (self.kill_pid)(pid, true) {
                self.emit(
                    app,
                    "process",
                    "SWITCH_PROCESS_FORCE_FAILED",
                    Some(ErrorCode::SwitchProcess),
                    &format!("{err:#}"),
                );
                return Err(err);
            }
            self.emit(app, "process", "SWITCH_PROCESS_FORCE_KILL", None, &format!("pid={pid}"));
        }
        Ok(())
    }

    /// Require `current/<bin>` to exist; spawn it detached when relaunch is
    /// enabled. Any failure here triggers rollback in the caller.
    fn healthcheck_and_relaunch(&self, current_path: &Path, bin: &str) -> Result<()> {
        if bin.is_empty() {
            bail!("manifest bin is required");
        }
        let bin_path = current_path.join(bin);
        std::fs::metadata(&bin_path)
            .with_context(|| format!("healthcheck missing bin {}", bin_path.display()))?;
        if self.relaunch {
            (self.launch)(&bin_path).context("relaunch failed")?;
        }
        Ok(())
    }

    /// Handle a health-check failure: re-point `current` at the previous
    /// target, persist terminal state, and compose the reported error when
    /// the rollback itself also fails.
    fn rollback_after_healthcheck(
        &self,
        app: &str,
        state_path: &Path,
        state: &mut RuntimeState,
        current_path: &Path,
        prev_target: Option<&Path>,
        err: anyhow::Error,
    ) -> UpdateError {
        let rollback_result = switch::rollback_current(current_path, prev_target);
        state.pending_version.clear();
        state.last_error_code = ErrorCode::SwitchHealthcheck.as_str().to_string();
        state.last_error_message = format!("{err:#}");
        self.emit(
            app,
            "healthcheck",
            "SWITCH_HEALTHCHECK_FAILED",
            Some(ErrorCode::SwitchHealthcheck),
            &state.last_error_message,
        );

        match rollback_result {
            Err(rollback_err) => {
                state.last_error_code = ErrorCode::SwitchRollback.as_str().to_string();
                state.last_error_message = format!("{rollback_err:#}");
                self.emit(
                    app,
                    "rollback",
                    "SWITCH_ROLLBACK_FAILED",
                    Some(ErrorCode::SwitchRollback),
                    &state.last_error_message,
                );
                if let Err(save_err) = state::save_state(state_path, state) {
                    tracing::warn!("persist error state for {app}: {save_err:#}");
                }
                UpdateError::tagged(
                    ErrorCode::SwitchRollback,
                    format!("healthcheck failed: {err:#}; rollback failed: {rollback_err:#}"),
                )
            }
            Ok(()) => {
                if let Err(save_err) = state::save_state(state_path, state) {
                    tracing::warn!("persist error state for {app}: {save_err:#}");
                }
                self.emit(
                    app,
                    "rollback",
                    "SWITCH_ROLLBACK_DONE",
                    None,
                    "rollback to previous current completed",
                );
                UpdateError::tagged(ErrorCode::SwitchHealthcheck, format!("{err:#}"))
            }
        }
    }

    /// Record a terminal failure: clear `pending_version`, persist the tag
    /// and message, emit the matching `*_FAILED` event, and build the
    /// transaction's error value.
    #[allow(clippy::too_many_arguments)]
    fn fail(
        &self,
        app: &str,
        state_path: &Path,
        state: &mut RuntimeState,
        code: ErrorCode,
        stage: &str,
        event: &str,
        err: anyhow::Error,
    ) -> UpdateError {
        state.pending_version.clear();
        state.last_error_code = code.as_str().to_string();
        state.last_error_message = format!("{err:#}");
        self.emit(app, stage, event, Some(code), &state.last_error_message);
        if let Err(save_err) = state::save_state(state_path, state) {
            tracing::warn!("persist error state for {app}: {save_err:#}");
        }
        UpdateError::tagged(code, format!("{err:#}"))
    }

    fn emit(&self, app: &str, stage: &str, event: &str, code: Option<ErrorCode>, message: &str) {
        let at = (self.now)();
        events::append_event(
            &self.app_dir(app),
            at,
            &events::EventRecord {
                timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, true),
                app: app.to_string(),
                stage: stage.to_string(),
                event: event.to_string(),
                error_code: code.map(|c| c.as_str().to_string()).unwrap_or_default(),
                message: message.to_string(),
            },
        );
    }

    fn message(&self, level: MessageLevel, text: &str) {
        if let Some(hook) = &self.on_message {
            hook(level, text);
        }
    }

    fn http_client(&self) -> Result<reqwest::Client, UpdateError> {
        reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|err| UpdateError::internal(format!("build http client: {err}")))
    }

    fn app_dir(&self, app: &str) -> PathBuf {
        self.root.join("apps").join(app)
    }

    fn timestamp(&self) -> String {
        (self.now)().to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Default switch-confirmation collaborator: a terminal y/N prompt.
fn terminal_confirm(app: &str, version: &str) -> Result<bool> {
    use std::io::Write;
    print!("[{app}] version {version} is ready. Switch now? [y/N] ");
    std::io::stdout().flush().context("flush confirmation prompt")?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("read confirmation answer")?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn remove_dir_all_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
