//! Appstract — a just-in-time application launcher and background updater.
//!
//! Apps are registered through declarative JSON manifests. The system
//! downloads, verifies, extracts and atomically switches between versioned
//! installations under a managed root directory. `run` launches the
//! currently installed version immediately and kicks off an update attempt
//! in the background; `update` sweeps every registered manifest.
//!
//! # Architecture Overview
//!
//! The heart of the crate is the update transaction engine in [`updater`]:
//! a state machine that takes a manifest plus the current on-disk version
//! and executes a crash-safe pipeline of optional version discovery,
//! download, SHA-256 verification, zip extraction, pre-install hooks,
//! process termination, atomic current-pointer switch, health check,
//! rollback on failure, and old-version garbage collection — all under a
//! single-writer per-app lock with a durable state journal and structured
//! event log.
//!
//! Everything else is a thin collaborator around that engine:
//!
//! - [`manifest`] — manifest parsing, validation, artifact resolution
//! - [`workspace`] — root resolution and directory-layout bootstrap
//! - [`config`] — `config.toml` decoding (`keep_versions`, `output_level`)
//! - [`cli`] — clap-based commands (`init`, `add`, `run`, `update`,
//!   `manifest validate`)
//! - [`utils`] — filesystem helpers and terminal progress rendering
//!
//! # On-disk layout
//!
//! ```text
//! <root>/apps/<app>/
//!   current                    — junction/symlink to v<X>, or marker dir
//!   v<X>/                      — one materialized, verified installation
//!   _staging/v<X>/             — transient download/extract workspace
//!   runtime.json               — durable per-app state
//!   .lock                      — single-writer lock ({pid, created_at})
//!   logs/events-YYYYMMDD.log   — append-only structured audit trail
//!   logs/preinstall-<ts>.log   — combined pre-install hook output
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use appstract::updater::UpdateManager;
//!
//! # async fn example() -> Result<(), appstract::updater::UpdateError> {
//! let manager = UpdateManager::new("C:\\appstract").keep_versions(2);
//! manager
//!     .update_from_manifest("aria2", "C:\\appstract\\manifests\\aria2.json".as_ref())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod manifest;
pub mod updater;
pub mod utils;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_utils;
