//! `appstract add` — register a manifest and install the app.

use super::common::{derive_app_name, CommandContext, UpdateFlags};
use crate::manifest::Manifest;
use crate::utils::fs::copy_file;
use crate::utils::progress::MessageLevel;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Validate a manifest, copy it into `manifests/<app>.json` (the app name
/// is the file stem), then run an install transaction for it.
#[derive(Debug, Args)]
pub struct AddCommand {
    /// Manifest file to register.
    pub manifest: PathBuf,
}

impl AddCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let app = derive_app_name(&self.manifest)?;
        ctx.reporter.message(
            MessageLevel::Default,
            &format!("add start: app={app} manifest={}", self.manifest.display()),
        );
        ctx.ensure_ready()?;

        Manifest::parse_file(&self.manifest).context("validate add manifest")?;
        ctx.reporter.message(
            MessageLevel::Default,
            &format!("[ok] manifest validated: {}", self.manifest.display()),
        );

        let target = ctx.manifest_path(&app);
        copy_file(&self.manifest, &target).context("copy manifest")?;
        ctx.reporter.message(
            MessageLevel::Default,
            &format!("[ok] manifest saved: {}", target.display()),
        );

        ctx.manager(&UpdateFlags::default())
            .update_from_manifest(&app, &target)
            .await
            .with_context(|| format!("install app {app:?} from manifest"))?;
        ctx.reporter
            .message(MessageLevel::Default, &format!("[ok] add completed: {app}"));
        Ok(())
    }
}
