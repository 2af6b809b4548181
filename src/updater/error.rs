//! Error taxonomy for update transactions.
//!
//! Every failing transaction is reported through a single [`UpdateError`]
//! carrying at most one canonical [`ErrorCode`]. The code is what gets
//! persisted into `runtime.json` as `last_error_code` and what event-log
//! `*_FAILED` records reference, so the set of codes is a stable contract:
//! renaming a variant's string form is a breaking change for anything that
//! consumes the state file or event log.

use std::fmt;
use thiserror::Error;

/// Canonical failure tags recorded in `runtime.json` and the event log.
///
/// Each update transaction fails with exactly one of these. The string form
/// (see [`ErrorCode::as_str`]) is stable and machine-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The manifest (possibly after discovery) cannot yield a verifiable
    /// artifact: missing URL or missing hash.
    ManifestIncomplete,
    /// Another live process holds the app's update lock.
    AlreadyRunning,
    /// The discovery request could not be sent or its body not decoded.
    NetCheckverRequest,
    /// The discovery endpoint answered with a non-2xx status.
    NetCheckverHttp,
    /// Transport-level download failure (scheme, connection, HTTP status).
    NetDownload,
    /// The download stage failed.
    PkgDownload,
    /// The downloaded artifact did not match the expected SHA-256 digest.
    PkgVerify,
    /// The archive could not be extracted or materialized.
    PkgExtract,
    /// A pre-install hook failed or timed out.
    ScriptPreinstall,
    /// The interactive switch confirmation collaborator errored.
    SwitchPrompt,
    /// Running processes under the current path could not be stopped.
    SwitchProcess,
    /// The `current` pointer could not be retargeted.
    SwitchCurrent,
    /// The switched installation failed its health check.
    SwitchHealthcheck,
    /// Rolling back to the previous target failed after a health-check
    /// failure.
    SwitchRollback,
}

impl ErrorCode {
    /// Stable string form used in `runtime.json` and event records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ManifestIncomplete => "MANIFEST_INCOMPLETE",
            Self::AlreadyRunning => "ALREADY_RUNNING",
            Self::NetCheckverRequest => "NET_CHECKVER_REQUEST",
            Self::NetCheckverHttp => "NET_CHECKVER_HTTP",
            Self::NetDownload => "NET_DOWNLOAD",
            Self::PkgDownload => "PKG_DOWNLOAD",
            Self::PkgVerify => "PKG_VERIFY",
            Self::PkgExtract => "PKG_EXTRACT",
            Self::ScriptPreinstall => "SCRIPT_PREINSTALL",
            Self::SwitchPrompt => "SWITCH_PROMPT",
            Self::SwitchProcess => "SWITCH_PROCESS",
            Self::SwitchCurrent => "SWITCH_CURRENT",
            Self::SwitchHealthcheck => "SWITCH_HEALTHCHECK",
            Self::SwitchRollback => "SWITCH_ROLLBACK",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error value returned by a failing update transaction.
///
/// Tagged errors carry a taxonomy [`ErrorCode`]; infrastructure failures
/// that occur outside a tagged stage (for example an unreadable state file)
/// carry none.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UpdateError {
    code: Option<ErrorCode>,
    message: String,
}

impl UpdateError {
    /// Build an error carrying a canonical taxonomy code.
    pub fn tagged(code: ErrorCode, message: impl fmt::Display) -> Self {
        Self {
            code: Some(code),
            message: message.to_string(),
        }
    }

    /// Build an untagged infrastructure error.
    pub fn internal(message: impl fmt::Display) -> Self {
        Self {
            code: None,
            message: message.to_string(),
        }
    }

    /// The taxonomy code, if this failure maps to one.
    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    /// Human-readable cause chain.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for UpdateError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}
