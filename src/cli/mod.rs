//! Command-line interface.
//!
//! Each command lives in its own module with a clap `Args` struct and an
//! `execute()` method. Global flags select the workspace root and the
//! output level; everything else is per-command.
//!
//! ```bash
//! appstract init                     # create the workspace layout
//! appstract add ./manifests/aria2.json
//! appstract run aria2                # launch + background update
//! appstract update --checkver       # sweep every registered manifest
//! appstract manifest validate ./aria2.json
//! ```

mod add;
pub mod common;
mod init;
mod manifest;
mod run;
mod update;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI: global flags plus one subcommand.
#[derive(Parser)]
#[command(
    name = "appstract",
    about = "Just-in-time application launcher and background updater",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root directory (overrides APPSTRACT_HOME and the
    /// executable's location).
    #[arg(long, global = true, value_name = "PATH")]
    root: Option<PathBuf>,

    /// Show debug detail.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress everything except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable the animated download progress bar.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the workspace directory layout and default config.
    Init(init::InitCommand),

    /// Register a manifest and install the app it describes.
    Add(add::AddCommand),

    /// Launch an app's current version and trigger a background update.
    Run(run::RunCommand),

    /// Update every app registered under manifests/.
    Update(update::UpdateCommand),

    /// Manifest tooling (validation).
    Manifest(manifest::ManifestCommand),
}

impl Cli {
    /// Default tracing filter derived from the verbosity flags; `RUST_LOG`
    /// still wins when set.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }

    /// Dispatch to the selected command.
    pub async fn execute(self) -> Result<()> {
        let ctx = common::CommandContext::resolve(
            self.root.as_deref(),
            self.verbose,
            self.quiet,
            self.no_progress,
        )?;
        match self.command {
            Commands::Init(cmd) => cmd.execute(&ctx),
            Commands::Add(cmd) => cmd.execute(&ctx).await,
            Commands::Run(cmd) => cmd.execute(&ctx).await,
            Commands::Update(cmd) => cmd.execute(&ctx).await,
            Commands::Manifest(cmd) => cmd.execute(&ctx),
        }
    }
}
