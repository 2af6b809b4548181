//! `appstract update` — sweep every registered manifest.
//!
//! Apps update strictly sequentially in name order. Per-app failures are
//! reported as they happen; the sweep continues (unless `--fail-fast`)
//! and finishes with a `total/success/failed` summary and a nonzero exit
//! when anything failed.

use super::common::{CommandContext, UpdateFlags};
use crate::utils::progress::MessageLevel;
use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct UpdateCommand {
    /// Resolve the latest version from checkver.github before updating.
    #[arg(long)]
    checkver: bool,

    /// Prompt before switching the current version.
    #[arg(long)]
    prompt_switch: bool,

    /// Relaunch each app after a successful switch.
    #[arg(long)]
    relaunch: bool,

    /// Stop after the first failed app update.
    #[arg(long)]
    fail_fast: bool,
}

impl UpdateCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        ctx.ensure_ready()?;
        let manifests_dir = ctx.root.join("manifests");
        ctx.reporter.message(
            MessageLevel::Default,
            &format!("update start: scanning manifests in {}", manifests_dir.display()),
        );

        let jobs = collect_jobs(&manifests_dir)?;
        if jobs.is_empty() {
            ctx.reporter.message(
                MessageLevel::Default,
                &format!("no manifests found in {}", manifests_dir.display()),
            );
            return Ok(());
        }
        ctx.reporter.message(
            MessageLevel::Default,
            &format!("found {} manifest(s)", jobs.len()),
        );

        let flags = UpdateFlags {
            checkver: self.checkver,
            prompt_switch: self.prompt_switch,
            relaunch: self.relaunch,
        };

        let total = jobs.len();
        let mut success = 0usize;
        let mut failed = 0usize;
        for (app, manifest_path) in &jobs {
            ctx.reporter
                .message(MessageLevel::Default, &format!("updating app: {app}"));
            match ctx
                .manager(&flags)
                .update_from_manifest(app, manifest_path)
                .await
            {
                Ok(()) => {
                    success += 1;
                    ctx.reporter.message(
                        MessageLevel::Default,
                        &format!("[ok] update completed: {app}"),
                    );
                }
                Err(err) => {
                    failed += 1;
                    ctx.reporter.error(&format!("update failed: {app} ({err})"));
                    if self.fail_fast {
                        summary(ctx, total, success, failed);
                        bail!("update failed for {app}");
                    }
                }
            }
        }
        summary(ctx, total, success, failed);
        if failed > 0 {
            bail!("{failed} app update(s) failed");
        }
        Ok(())
    }
}

fn summary(ctx: &CommandContext, total: usize, success: usize, failed: usize) {
    ctx.reporter.message(
        MessageLevel::Default,
        &format!("update summary: total={total} success={success} failed={failed}"),
    );
}

/// Collect `(app, manifest path)` jobs from `manifests/*.json`, sorted by
/// app name for a deterministic sweep order.
fn collect_jobs(manifests_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(manifests_dir)
        .with_context(|| format!("read manifests directory: {}", manifests_dir.display()))?;
    let mut jobs = Vec::new();
    for entry in entries {
        let entry = entry.context("read manifests directory entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if !is_json {
            continue;
        }
        let Some(app) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        if app.trim().is_empty() {
            continue;
        }
        jobs.push((app, path));
    }
    jobs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(jobs)
}
