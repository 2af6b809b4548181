//! Pre-install hook execution.
//!
//! The manifest's `pre_install` steps are opaque PowerShell expressions.
//! They are concatenated into one script under a strict preamble that
//! aborts on any error, silences interactive progress, binds `$dir` to the
//! extracted payload directory, and imports the shared workspace module
//! when one exists. The combined output is always written to a per-run log
//! before the success/failure decision is returned, so a failing hook can
//! be diagnosed after the fact.
//!
//! Hooks are not sandboxed; the hard timeout is the only enforcement.

use crate::constants::SHARED_MODULE_FILE;
use crate::utils::fs::{ensure_dir, find_in_path};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Run the ordered pre-install steps against `dir`.
///
/// `root` is the workspace root (for the shared module and the log
/// directory), `app` names the app whose log directory receives the
/// output, and `started_at` stamps the log file name.
pub async fn run_pre_install(
    root: &Path,
    app: &str,
    dir: &Path,
    steps: &[String],
    timeout: Duration,
    started_at: DateTime<Utc>,
) -> Result<()> {
    if steps.is_empty() {
        return Ok(());
    }
    let shell = find_powershell()?;

    let log_dir = root.join("apps").join(app).join("logs");
    ensure_dir(&log_dir)?;
    let log_path = log_dir.join(format!(
        "preinstall-{}.log",
        started_at.format("%Y%m%dT%H%M%SZ")
    ));

    let module_path = root.join("scripts").join(SHARED_MODULE_FILE);
    let script = build_script(dir, &module_path, steps);

    let mut command = tokio::process::Command::new(&shell);
    command
        .args(["-NoProfile", "-NonInteractive", "-Command"])
        .arg(&script)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);

    let result = tokio::time::timeout(timeout, command.output()).await;
    match result {
        Err(_) => {
            // The child is killed on drop; whatever it printed is gone with
            // it, so the log records the timeout itself.
            let note = format!("pre_install timed out after {}s\n", timeout.as_secs());
            std::fs::write(&log_path, note)
                .with_context(|| format!("write pre_install log: {}", log_path.display()))?;
            bail!(
                "pre_install timeout ({}s), see log: {}",
                timeout.as_secs(),
                log_path.display()
            );
        }
        Ok(run) => {
            let output = run.context("run pre_install shell")?;
            let mut combined = output.stdout;
            combined.extend_from_slice(&output.stderr);
            std::fs::write(&log_path, &combined)
                .with_context(|| format!("write pre_install log: {}", log_path.display()))?;
            if !output.status.success() {
                bail!(
                    "pre_install failed: {}, see log: {}",
                    output.status,
                    log_path.display()
                );
            }
            Ok(())
        }
    }
}

/// Locate the PowerShell host, preferring the modern `pwsh` over the
/// legacy `powershell`.
fn find_powershell() -> Result<PathBuf> {
    find_in_path(&["pwsh", "powershell"])
        .ok_or_else(|| anyhow!("powershell executable not found"))
}

/// Assemble the combined script: strict preamble, `$dir` binding, optional
/// shared-module import, then the steps verbatim in declaration order.
fn build_script(dir: &Path, module_path: &Path, steps: &[String]) -> String {
    let dir_quoted = escape_single_quoted(&dir.display().to_string());
    let module_quoted = escape_single_quoted(&module_path.display().to_string());
    let mut script = String::new();
    script.push_str("$ErrorActionPreference = \"Stop\"\n");
    script.push_str("$ProgressPreference = \"SilentlyContinue\"\n");
    script.push_str(&format!("$dir = '{dir_quoted}'\n"));
    script.push_str(&format!(
        "if (Test-Path '{module_quoted}') {{ Import-Module '{module_quoted}' -Force }}\n"
    ));
    for step in steps {
        script.push_str(step);
        script.push('\n');
    }
    script
}

/// Escape a string for a single-quoted PowerShell literal.
fn escape_single_quoted(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_carries_preamble_binding_and_steps_in_order() {
        let steps = vec![
            "Expand-Archive \"$dir\\inner.zip\" $dir".to_string(),
            "Remove-Item \"$dir\\inner.zip\"".to_string(),
        ];
        let script = build_script(
            Path::new("C:\\root\\apps\\aria2\\_staging\\v1\\extracted"),
            Path::new("C:\\root\\scripts\\Appstract.psm1"),
            &steps,
        );

        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "$ErrorActionPreference = \"Stop\"");
        assert_eq!(lines[1], "$ProgressPreference = \"SilentlyContinue\"");
        assert!(lines[2].starts_with("$dir = '"));
        assert!(lines[3].contains("Import-Module"));
        assert!(lines[3].contains("Appstract.psm1"));
        assert_eq!(lines[4], steps[0]);
        assert_eq!(lines[5], steps[1]);
    }

    #[test]
    fn single_quotes_are_doubled() {
        assert_eq!(escape_single_quoted("it's"), "it''s");
        assert_eq!(escape_single_quoted("plain"), "plain");

        let script = build_script(Path::new("/tmp/o'dir"), Path::new("/tmp/mod"), &[]);
        assert!(script.contains("$dir = '/tmp/o''dir'"));
    }

    #[test]
    fn empty_steps_produce_no_step_lines() {
        let script = build_script(Path::new("/tmp/x"), Path::new("/tmp/mod"), &[]);
        assert_eq!(script.lines().count(), 4);
    }
}
