//! App manifest parsing, validation, and artifact resolution.
//!
//! A manifest is a declarative JSON document describing one app: its
//! version, the executable inside a version directory, where to download
//! the 64-bit artifact, the SHA-256 digest to verify it against, and
//! optional version-discovery and pre-install hooks.
//!
//! ```json
//! {
//!   "version": "1.37.0-1",
//!   "bin": "aria2c.exe",
//!   "architecture": {
//!     "64bit": {
//!       "url": "https://example.com/aria2.zip",
//!       "hash": "67d01530…",
//!       "extract_dir": "aria2-1.37.0-win-64bit-build1"
//!     }
//!   },
//!   "checkver": {
//!     "github": "https://github.com/aria2/aria2",
//!     "regex": "/aria2-(?<version>[\\d.]+)-win-64bit-build(?<build>\\d+)\\.zip",
//!     "replace": "${version}-${build}"
//!   },
//!   "autoupdate": {
//!     "architecture": {
//!       "64bit": { "url": "https://example.com/aria2-$matchVersion.zip" }
//!     }
//!   }
//! }
//! ```
//!
//! Parsing guarantees that `version` and `bin` are non-empty and that a
//! verifiable 64-bit artifact resolves, so downstream code never has to
//! re-check those.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Declarative description of one app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Opaque version identifier (e.g. `1.37.0-1`).
    pub version: String,

    /// Optional human-readable description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Optional release-discovery declaration.
    #[serde(skip_serializing_if = "Checkver::is_empty")]
    pub checkver: Checkver,

    /// Pinned artifact block; wins over `autoupdate` when its URL is set.
    pub architecture: Architecture,

    /// Templated artifact block applied when discovery finds a newer
    /// version.
    pub autoupdate: Autoupdate,

    /// Executable path relative to a version directory.
    pub bin: String,

    /// Declared shortcuts; decoded for completeness, unused by the engine.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shortcuts: Vec<Vec<String>>,

    /// Ordered pre-install hook expressions, passed verbatim to the script
    /// runner.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pre_install: Vec<String>,

    /// Fallback digest promoted into an artifact block that lacks one.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

/// Release-discovery declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkver {
    /// GitHub repository URL whose latest release is queried.
    pub github: String,
    /// Regex with named captures tried against each release asset URL.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub regex: String,
    /// Template rendered from the captures to produce the version string.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub replace: String,
}

impl Checkver {
    /// Whether the block is entirely absent.
    pub fn is_empty(&self) -> bool {
        self.github.is_empty() && self.regex.is_empty() && self.replace.is_empty()
    }

    /// Whether all fields required to run discovery are present.
    pub fn is_complete(&self) -> bool {
        !self.github.is_empty() && !self.regex.is_empty() && !self.replace.is_empty()
    }
}

/// Per-architecture artifact table. Only 64-bit is supported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Architecture {
    /// The 64-bit artifact block.
    #[serde(rename = "64bit")]
    pub x64: Artifact,
}

/// `autoupdate` wrapper mirroring the manifest's nesting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Autoupdate {
    /// Templated artifact table.
    pub architecture: Architecture,
}

/// A downloadable artifact: URL, expected digest, optional in-archive
/// subdirectory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Artifact {
    /// Download URL.
    pub url: String,
    /// Expected SHA-256 digest (`sha256:` prefix tolerated).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hash: String,
    /// Subdirectory inside the extracted archive holding the payload.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub extract_dir: String,
}

impl Manifest {
    /// Parse and validate a manifest file.
    pub fn parse_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read manifest file: {}", path.display()))?;
        Self::parse_bytes(&bytes)
    }

    /// Parse and validate manifest bytes.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        let manifest: Self =
            serde_json::from_slice(bytes).context("decode manifest json")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the invariants the rest of the system relies on.
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            bail!("manifest version is required");
        }
        if self.bin.is_empty() {
            bail!("manifest bin is required");
        }
        self.resolve_artifact_64()?;
        Ok(())
    }

    /// Resolve the effective 64-bit artifact.
    ///
    /// The pinned `architecture.64bit` block wins when it carries a URL;
    /// otherwise the `autoupdate` block is used. A block without a hash
    /// inherits the manifest's top-level `hash`. Both URL and hash must end
    /// up non-empty — an artifact that cannot be verified must never be
    /// downloaded.
    pub fn resolve_artifact_64(&self) -> Result<Artifact> {
        let mut artifact = self.architecture.x64.clone();
        if artifact.url.is_empty() {
            artifact = self.autoupdate.architecture.x64.clone();
        }
        if artifact.url.is_empty() {
            bail!("manifest 64bit artifact url is required");
        }
        if artifact.hash.is_empty() && !self.hash.is_empty() {
            artifact.hash = self.hash.clone();
        }
        if artifact.hash.is_empty() {
            bail!("manifest 64bit artifact hash is required");
        }
        Ok(artifact)
    }
}
