mod common;
use common::{unreachable_manifest, TestWorkspace};

#[test]
fn update_demands_an_initialized_workspace() {
    let ws = TestWorkspace::new();
    ws.run(&["update"])
        .assert_failure()
        .assert_stderr_contains("workspace not initialized");
}

#[test]
fn update_with_no_manifests_is_a_clean_no_op() {
    let ws = TestWorkspace::new();
    ws.init();
    ws.run(&["update"])
        .assert_success()
        .assert_stdout_contains("no manifests found");
}

#[test]
fn per_app_failures_are_summarized_with_nonzero_exit() {
    let ws = TestWorkspace::new();
    ws.init();
    ws.write_manifest("aaa", r#"{"version": ""}"#);
    ws.write_manifest("bbb", &unreachable_manifest());

    let result = ws.run(&["update"]);
    result
        .assert_failure()
        .assert_stdout_contains("found 2 manifest(s)")
        .assert_stdout_contains("update summary: total=2 success=0 failed=2")
        .assert_stderr_contains("update failed: aaa")
        .assert_stderr_contains("update failed: bbb");
}

#[test]
fn fail_fast_stops_at_the_first_failure() {
    let ws = TestWorkspace::new();
    ws.init();
    ws.write_manifest("aaa", r#"{"version": ""}"#);
    ws.write_manifest("bbb", &unreachable_manifest());

    let result = ws.run(&["update", "--fail-fast"]);
    result
        .assert_failure()
        .assert_stdout_contains("update summary: total=2 success=0 failed=1")
        .assert_stderr_contains("update failed: aaa");
    // The sweep never reached the second app.
    assert!(!result.stderr().contains("update failed: bbb"));
}

#[test]
fn download_failure_records_state_for_the_app() {
    let ws = TestWorkspace::new();
    ws.init();
    ws.write_manifest("aria2", &unreachable_manifest());

    ws.run(&["update"]).assert_failure();

    let state_raw =
        std::fs::read_to_string(ws.root().join("apps").join("aria2").join("runtime.json"))
            .unwrap();
    assert!(state_raw.contains("\"last_error_code\": \"PKG_DOWNLOAD\""));
    assert!(!ws.root().join("apps").join("aria2").join(".lock").exists());
}
