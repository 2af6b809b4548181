//! System process control backends.
//!
//! The supervisor in the transaction engine works against injectable
//! function hooks; the implementations here are the production backends.
//! On Windows they shell out to PowerShell and `taskkill` — the same
//! tooling an operator would reach for — and on other platforms they
//! degrade to no-ops, since the `current` path prefix they filter on only
//! exists in a Windows deployment.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

/// Enumerate PIDs whose executable path starts with `prefix`
/// (case-insensitively).
#[cfg(windows)]
pub fn find_pids_by_prefix(prefix: &Path) -> Result<Vec<u32>> {
    let script = format!(
        "$prefix = '{}'; \
         $p = Get-CimInstance Win32_Process | Where-Object {{ $_.ExecutablePath -and $_.ExecutablePath.StartsWith($prefix, [System.StringComparison]::OrdinalIgnoreCase) }} | Select-Object -ExpandProperty ProcessId; \
         if ($null -eq $p) {{ '' }} else {{ $p | ConvertTo-Json -Compress }}",
        escape_single_quoted(&prefix.display().to_string())
    );
    let output = powershell_command()?
        .args(["-NoProfile", "-NonInteractive", "-Command"])
        .arg(script)
        .output()
        .context("query process list")?;
    if !output.status.success() {
        bail!(
            "query process list: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    parse_pid_listing(&String::from_utf8_lossy(&output.stdout))
}

/// No processes to match outside Windows.
#[cfg(not(windows))]
pub fn find_pids_by_prefix(_prefix: &Path) -> Result<Vec<u32>> {
    Ok(Vec::new())
}

/// Ask a process to close its main window. Best-effort: processes without
/// a window are left alone and absence is not an error.
#[cfg(windows)]
pub fn graceful_close(pid: u32) -> Result<()> {
    let script = format!(
        "$p = Get-Process -Id {pid} -ErrorAction SilentlyContinue; \
         if ($null -eq $p) {{ exit 0 }}; \
         if ($p.MainWindowHandle -eq 0) {{ exit 0 }}; \
         if ($p.CloseMainWindow()) {{ exit 0 }} else {{ exit 1 }}"
    );
    let output = powershell_command()?
        .args(["-NoProfile", "-NonInteractive", "-Command"])
        .arg(script)
        .output()
        .with_context(|| format!("graceful close pid={pid}"))?;
    if !output.status.success() {
        bail!(
            "graceful close pid={pid} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(not(windows))]
pub fn graceful_close(_pid: u32) -> Result<()> {
    Ok(())
}

/// Terminate a process tree; `force` escalates from a polite terminate to
/// a hard kill.
#[cfg(windows)]
pub fn kill_pid(pid: u32, force: bool) -> Result<()> {
    let pid_arg = pid.to_string();
    let mut args = vec!["/PID", pid_arg.as_str(), "/T"];
    if force {
        args.push("/F");
    }
    let output = Command::new("taskkill")
        .args(&args)
        .output()
        .with_context(|| format!("taskkill pid={pid}"))?;
    if !output.status.success() {
        bail!(
            "taskkill pid={pid} force={force} failed: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
    }
    Ok(())
}

#[cfg(not(windows))]
pub fn kill_pid(_pid: u32, _force: bool) -> Result<()> {
    Ok(())
}

/// Whether a PID belongs to a live process.
///
/// Used for stale-lock arbitration, so the conservative answer on
/// platforms where we cannot tell is "alive".
#[cfg(windows)]
pub fn pid_alive(pid: u32) -> bool {
    let output = Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/FO", "CSV", "/NH"])
        .output();
    let Ok(output) = output else { return true };
    let raw = String::from_utf8_lossy(&output.stdout).to_lowercase();
    if raw.contains("no tasks are running") {
        return false;
    }
    raw.contains(&format!("\"{pid}\""))
}

#[cfg(all(unix, target_os = "linux"))]
pub fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(any(windows, target_os = "linux")))]
pub fn pid_alive(_pid: u32) -> bool {
    true
}

/// Spawn an executable detached from the current process; the child is not
/// awaited and inherits nothing we care about.
pub fn launch_detached(path: &Path) -> Result<()> {
    Command::new(path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map(|_| ())
        .with_context(|| format!("launch {}", path.display()))
}

#[cfg(windows)]
fn powershell_command() -> Result<Command> {
    let shell = crate::utils::fs::find_in_path(&["pwsh", "powershell"])
        .ok_or_else(|| anyhow::anyhow!("powershell executable not found"))?;
    Ok(Command::new(shell))
}

#[cfg(windows)]
fn escape_single_quoted(s: &str) -> String {
    s.replace('\'', "''")
}

/// Decode the PID listing emitted by the enumeration script: empty/`null`
/// for nothing, a bare number for one match, a JSON array for several.
#[allow(dead_code)]
fn parse_pid_listing(raw: &str) -> Result<Vec<u32>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return Ok(Vec::new());
    }
    if raw.starts_with('[') {
        if let Ok(pids) = serde_json::from_str::<Vec<u32>>(raw) {
            return Ok(pids);
        }
    }
    if let Ok(pid) = serde_json::from_str::<u32>(raw) {
        return Ok(vec![pid]);
    }
    bail!("unexpected process query output: {raw}")
}
