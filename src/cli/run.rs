//! `appstract run` — launch the current version, then update in the
//! background.
//!
//! The foreground binary is spawned detached as soon as the health checks
//! pass; only then does the background update fire. A failing background
//! update is reported to stderr and never changes the run exit code — the
//! user asked to launch the app, and the app launched.

use super::common::{CommandContext, UpdateFlags};
use crate::manifest::Manifest;
use crate::updater::process::launch_detached;
use crate::utils::progress::MessageLevel;
use anyhow::{bail, Context, Result};
use clap::Args;

#[derive(Debug, Args)]
pub struct RunCommand {
    /// App to launch.
    pub app: String,
}

impl RunCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let app = &self.app;
        ctx.reporter.message(
            MessageLevel::Default,
            &format!("run start: app={app} root={}", ctx.root.display()),
        );
        ctx.ensure_ready()?;

        let manifest_path = ctx.manifest_path(app);
        let current_path = ctx.current_path(app);

        if std::fs::symlink_metadata(&current_path).is_err() {
            if !manifest_path.is_file() {
                bail!("app {app:?} has no current version at {}", current_path.display());
            }
            ctx.reporter.message(
                MessageLevel::Default,
                &format!(
                    "app {app:?} is not installed, auto-installing from manifest: {}",
                    manifest_path.display()
                ),
            );
            ctx.manager(&UpdateFlags::default())
                .update_from_manifest(app, &manifest_path)
                .await
                .with_context(|| format!("install app {app:?} for run"))?;
            ctx.reporter.message(
                MessageLevel::Default,
                &format!("[ok] auto-install completed: {app}"),
            );
            if std::fs::symlink_metadata(&current_path).is_err() {
                bail!("app {app:?} has no current version at {}", current_path.display());
            }
        }

        let manifest = Manifest::parse_file(&manifest_path).context("load manifest for run")?;
        let bin_path = current_path.join(&manifest.bin);
        if !bin_path.is_file() {
            bail!("app {app:?} bin missing at {}", bin_path.display());
        }

        ctx.reporter.message(
            MessageLevel::Default,
            &format!("launching app binary: {}", bin_path.display()),
        );
        launch_detached(&bin_path).with_context(|| format!("launch app {app:?}"))?;
        ctx.reporter.message(
            MessageLevel::Default,
            &format!("[ok] run-started: {app} ({})", bin_path.display()),
        );

        // Background update on a detached task. Its outcome is logged and
        // deliberately dropped: the foreground launch already succeeded.
        let manager = ctx.manager(&UpdateFlags::default());
        let task_app = app.clone();
        let task_manifest = manifest_path.clone();
        let update_task = tokio::spawn(async move {
            manager
                .update_from_manifest(&task_app, &task_manifest)
                .await
        });
        match update_task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                ctx.reporter
                    .error(&format!("background update failed for {app:?}: {err}"));
            }
            Err(join_err) => {
                ctx.reporter
                    .error(&format!("background update aborted for {app:?}: {join_err}"));
            }
        }
        Ok(())
    }
}
