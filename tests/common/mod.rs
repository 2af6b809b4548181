//! Shared harness for integration tests: a temp workspace plus helpers to
//! run the produced binary against it.

#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// One temp workspace per test, torn down on drop.
pub struct TestWorkspace {
    temp: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("create temp workspace"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Run the binary with `APPSTRACT_HOME` pointed at this workspace.
    pub fn run(&self, args: &[&str]) -> CommandResult {
        let output = Command::new(env!("CARGO_BIN_EXE_appstract"))
            .args(args)
            .env("APPSTRACT_HOME", self.root())
            .env("NO_COLOR", "1")
            .output()
            .expect("run appstract binary");
        CommandResult { output }
    }

    /// Initialize the workspace layout through the binary itself.
    pub fn init(&self) {
        self.run(&["init"]).assert_success();
    }

    /// Write a manifest under `manifests/<app>.json`.
    pub fn write_manifest(&self, app: &str, contents: &str) {
        let dir = self.root().join("manifests");
        std::fs::create_dir_all(&dir).expect("create manifests dir");
        std::fs::write(dir.join(format!("{app}.json")), contents).expect("write manifest");
    }
}

/// Captured process result with assertion helpers.
pub struct CommandResult {
    output: Output,
}

impl CommandResult {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn assert_success(&self) -> &Self {
        assert!(
            self.output.status.success(),
            "expected success, got {:?}\nstdout: {}\nstderr: {}",
            self.output.status.code(),
            self.stdout(),
            self.stderr()
        );
        self
    }

    pub fn assert_failure(&self) -> &Self {
        assert!(
            !self.output.status.success(),
            "expected failure, got success\nstdout: {}\nstderr: {}",
            self.stdout(),
            self.stderr()
        );
        self
    }

    pub fn assert_stdout_contains(&self, needle: &str) -> &Self {
        assert!(
            self.stdout().contains(needle),
            "stdout missing {needle:?}\nstdout: {}\nstderr: {}",
            self.stdout(),
            self.stderr()
        );
        self
    }

    pub fn assert_stderr_contains(&self, needle: &str) -> &Self {
        assert!(
            self.stderr().contains(needle),
            "stderr missing {needle:?}\nstdout: {}\nstderr: {}",
            self.stdout(),
            self.stderr()
        );
        self
    }
}

/// A syntactically valid manifest whose artifact URL refuses connections
/// instantly (no DNS, no route).
pub fn unreachable_manifest() -> String {
    r#"{
        "version": "1.37.0-1",
        "architecture": {
            "64bit": {
                "url": "https://127.0.0.1:1/aria2.zip",
                "hash": "67d015301eef0b612191212d564c5bb0a14b5b9c4796b76454276a4d28d9b288",
                "extract_dir": "aria2-1.37.0-win-64bit-build1"
            }
        },
        "bin": "aria2c.exe"
    }"#
    .to_string()
}
