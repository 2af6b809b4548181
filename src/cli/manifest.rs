//! `appstract manifest` — manifest tooling.

use super::common::CommandContext;
use crate::manifest::Manifest;
use crate::utils::progress::MessageLevel;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ManifestCommand {
    #[command(subcommand)]
    action: ManifestAction,
}

#[derive(Debug, Subcommand)]
enum ManifestAction {
    /// Parse a manifest file and check its required fields.
    Validate {
        /// Manifest file to validate.
        file: PathBuf,
    },
}

impl ManifestCommand {
    pub fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match &self.action {
            ManifestAction::Validate { file } => {
                let manifest = Manifest::parse_file(file)?;
                ctx.reporter.message(
                    MessageLevel::Default,
                    &format!("[ok] manifest valid: version={}", manifest.version),
                );
                Ok(())
            }
        }
    }
}
