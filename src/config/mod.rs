//! Workspace configuration (`config.toml` at the root).
//!
//! The schema is deliberately small: the update engine consumes
//! `keep_versions`, the CLI consumes `output_level`, and unknown keys are
//! ignored so older binaries tolerate newer config files.

use crate::constants::DEFAULT_KEEP_VERSIONS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Verbosity of CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLevel {
    /// Errors only.
    Silent,
    /// Normal status lines.
    #[default]
    Default,
    /// Status lines plus debug detail.
    Debug,
}

impl FromStr for OutputLevel {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "silent" | "quiet" | "none" | "off" | "error" => Ok(Self::Silent),
            "default" | "normal" | "info" => Ok(Self::Default),
            "debug" | "verbose" | "trace" => Ok(Self::Debug),
            other => anyhow::bail!(
                "invalid output level {other:?} (expected: silent|default|debug)"
            ),
        }
    }
}

impl fmt::Display for OutputLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Silent => "silent",
            Self::Default => "default",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// Decoded workspace configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Old version directories retained after a successful switch.
    pub keep_versions: u32,
    /// Default CLI verbosity, overridable with `--verbose`/`--quiet`.
    pub output_level: OutputLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keep_versions: DEFAULT_KEEP_VERSIONS,
            output_level: OutputLevel::Default,
        }
    }
}

impl Config {
    /// Load `config.toml` from the workspace root.
    ///
    /// A missing file yields the default configuration; a present but
    /// undecodable file is an error (silently reverting retention policy to
    /// defaults would surprise the operator).
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("config.toml");
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read config: {}", path.display()));
            }
        };
        toml::from_str(&raw).with_context(|| format!("decode config: {}", path.display()))
    }
}
