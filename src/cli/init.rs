//! `appstract init` — create the workspace directory layout.

use super::common::CommandContext;
use crate::utils::progress::MessageLevel;
use crate::workspace;
use anyhow::Result;
use clap::Args;

/// Initialize the workspace: `manifests/`, `shims/`, `scripts/`, `apps/`
/// and a default `config.toml`. Safe to re-run.
#[derive(Debug, Args)]
pub struct InitCommand {}

impl InitCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        ctx.reporter.message(
            MessageLevel::Default,
            &format!("initializing workspace: {}", ctx.root.display()),
        );
        workspace::init_layout(&ctx.root)?;
        ctx.reporter.message(
            MessageLevel::Default,
            &format!("[ok] initialized: {}", ctx.root.display()),
        );
        Ok(())
    }
}
