//! Global constants used throughout the Appstract codebase.
//!
//! Timeout durations, retention defaults, and well-known file names that are
//! used across multiple modules. Defining them centrally keeps magic numbers
//! discoverable.

use std::time::Duration;

/// Environment variable that overrides the workspace root.
pub const ENV_HOME: &str = "APPSTRACT_HOME";

/// Number of old version directories retained after a successful switch.
pub const DEFAULT_KEEP_VERSIONS: u32 = 2;

/// Hard timeout for the combined pre-install script.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for the process supervisor's wait loop before escalating to a
/// forced kill.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval of the process supervisor's wait loop.
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Overall request timeout for downloads and discovery calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Default GitHub API base used by version discovery.
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

/// Marker file inside a plain-directory `current` pointer naming the target.
pub const CURRENT_MARKER_FILE: &str = ".appstract-target";

/// Shared PowerShell module imported into pre-install scripts when present.
pub const SHARED_MODULE_FILE: &str = "Appstract.psm1";

/// File name of the downloaded artifact inside a staging directory.
pub const STAGING_ARCHIVE_NAME: &str = "package.zip";
