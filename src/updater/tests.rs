//! End-to-end transaction scenarios driven through [`UpdateManager`]
//! against temp roots, in-process HTTP fixtures, and injected process
//! hooks.

use super::*;
use crate::manifest::{Architecture, Artifact, Autoupdate, Manifest};
use crate::test_utils::{build_zip, serve_bytes, serve_json, serve_status, sha256_hex};
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const APP: &str = "aria2";
const VERSION: &str = "1.37.0-1";
const EXTRACT_DIR: &str = "aria2-1.37.0-win-64bit-build1";
const BIN: &str = "aria2c.exe";

fn test_clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap()
}

fn test_manager(root: &Path) -> UpdateManager {
    let mut mgr = UpdateManager::new(root).require_https(false);
    mgr.now = test_clock;
    mgr
}

fn aria2_zip() -> Vec<u8> {
    build_zip(&[(&format!("{EXTRACT_DIR}/{BIN}"), "binary")])
}

fn aria2_manifest(url: String, hash: String) -> Manifest {
    Manifest {
        version: VERSION.to_string(),
        bin: BIN.to_string(),
        architecture: Architecture {
            x64: Artifact {
                url,
                hash,
                extract_dir: EXTRACT_DIR.to_string(),
            },
        },
        ..Default::default()
    }
}

fn read_state(root: &Path) -> RuntimeState {
    state::load_state(&root.join("apps").join(APP).join("runtime.json")).unwrap()
}

fn read_events(root: &Path) -> String {
    std::fs::read_to_string(
        root.join("apps")
            .join(APP)
            .join("logs")
            .join("events-20260227.log"),
    )
    .unwrap_or_default()
}

#[tokio::test]
async fn happy_path_installs_switches_and_finalizes() {
    let root = TempDir::new().unwrap();
    let zip = aria2_zip();
    let hash = sha256_hex(&zip);
    let base = serve_bytes(zip).await;

    let manifest_path = root.path().join("aria2.json");
    std::fs::write(
        &manifest_path,
        format!(
            r#"{{
                "version": "{VERSION}",
                "architecture": {{
                    "64bit": {{
                        "url": "{base}/aria2.zip",
                        "hash": "{hash}",
                        "extract_dir": "{EXTRACT_DIR}"
                    }}
                }},
                "bin": "{BIN}"
            }}"#
        ),
    )
    .unwrap();

    let mgr = test_manager(root.path());
    mgr.update_from_manifest(APP, &manifest_path).await.unwrap();

    let app_dir = root.path().join("apps").join(APP);
    assert!(app_dir.join(format!("v{VERSION}")).join(BIN).is_file());
    assert_eq!(
        switch::resolve_current_target(&app_dir.join("current")).unwrap(),
        Some(app_dir.join(format!("v{VERSION}")))
    );

    let state = read_state(root.path());
    assert_eq!(state.current_version, VERSION);
    assert_eq!(state.pending_version, "");
    assert_eq!(state.last_error_code, "");
    assert_eq!(state.last_update_at, "2026-02-27T12:00:00Z");

    // Transient workspace and lock are gone after the terminal state.
    assert!(!app_dir.join("_staging").exists());
    assert!(!app_dir.join(".lock").exists());

    let events = read_events(root.path());
    assert!(events.contains("\"event\":\"UPDATE_BEGIN\""));
    assert!(events.contains("\"event\":\"PKG_DOWNLOAD_DONE\""));
    assert!(events.contains("\"event\":\"PKG_VERIFY_DONE\""));
    assert!(events.contains("\"event\":\"SWITCH_PROCESS_NONE\""));
    assert!(events.contains("\"event\":\"SWITCH_DONE\""));
    assert!(events.contains("\"event\":\"UPDATE_DONE\""));
    assert!(events.contains("\"stage\":\"update\""));
    assert!(!events.contains("_FAILED"));
}

#[tokio::test]
async fn hash_mismatch_records_pkg_verify_and_keeps_no_version_dir() {
    let root = TempDir::new().unwrap();
    let base = serve_bytes(aria2_zip()).await;
    let manifest = aria2_manifest(format!("{base}/aria2.zip"), "0000".to_string());

    let mgr = test_manager(root.path());
    let err = mgr.update(APP, &manifest).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::PkgVerify));
    assert!(err.to_string().contains("sha256 mismatch"));

    let state = read_state(root.path());
    assert_eq!(state.last_error_code, "PKG_VERIFY");
    assert_eq!(state.pending_version, "");
    assert!(!root
        .path()
        .join("apps")
        .join(APP)
        .join(format!("v{VERSION}"))
        .exists());
    assert!(!root.path().join("apps").join(APP).join(".lock").exists());

    // Exactly one *_FAILED record, and it matches the persisted tag.
    let events = read_events(root.path());
    let failed: Vec<&str> = events.lines().filter(|l| l.contains("_FAILED")).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].contains("\"event\":\"PKG_VERIFY_FAILED\""));
    assert!(failed[0].contains("\"error_code\":\"PKG_VERIFY\""));
    assert!(!events.contains("\"event\":\"UPDATE_DONE\""));
}

#[tokio::test]
async fn http_500_records_pkg_download_and_leaves_current_untouched() {
    let root = TempDir::new().unwrap();
    let base = serve_status(500).await;
    let manifest = aria2_manifest(
        format!("{base}/aria2.zip"),
        "67d015301eef0b612191212d564c5bb0a14b5b9c4796b76454276a4d28d9b288".to_string(),
    );

    let mgr = test_manager(root.path());
    let err = mgr.update(APP, &manifest).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::PkgDownload));
    assert!(err.to_string().contains("NET_DOWNLOAD"));

    let state = read_state(root.path());
    assert_eq!(state.last_error_code, "PKG_DOWNLOAD");
    assert!(!root.path().join("apps").join(APP).join("current").exists());
}

#[tokio::test]
async fn corrupt_archive_with_matching_hash_records_pkg_extract() {
    let root = TempDir::new().unwrap();
    let corrupt = b"not a zip".to_vec();
    let hash = sha256_hex(&corrupt);
    let base = serve_bytes(corrupt).await;
    let manifest = aria2_manifest(format!("{base}/aria2.zip"), hash);

    let mgr = test_manager(root.path());
    let err = mgr.update(APP, &manifest).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::PkgExtract));
    assert!(err.to_string().contains("open zip"));
    assert_eq!(read_state(root.path()).last_error_code, "PKG_EXTRACT");
}

#[tokio::test]
async fn discovery_without_restorable_hash_fails_before_any_download() {
    let root = TempDir::new().unwrap();
    let api = serve_json(
        "/repos/aria2/aria2/releases/latest",
        r#"{
            "tag_name": "release-1.38.0",
            "assets": [
                {"browser_download_url": "https://github.com/aria2/aria2/releases/download/release-1.38.0/aria2-1.38.0-win-64bit-build1.zip",
                 "name": "aria2-1.38.0-win-64bit-build1.zip"}
            ]
        }"#
        .to_string(),
    )
    .await;

    let manifest = Manifest {
        version: VERSION.to_string(),
        bin: BIN.to_string(),
        checkver: crate::manifest::Checkver {
            github: "https://github.com/aria2/aria2".to_string(),
            regex: r"/release-(?:[\d.]+)/aria2-(?<version>[\d.]+)-win-64bit-build(?<build>\d+)\.zip"
                .to_string(),
            replace: "${version}-${build}".to_string(),
        },
        architecture: Architecture {
            x64: Artifact {
                url: "https://example.invalid/aria2-1.37.0-win-64bit-build1.zip".to_string(),
                hash: "67d015301eef0b612191212d564c5bb0a14b5b9c4796b76454276a4d28d9b288"
                    .to_string(),
                extract_dir: EXTRACT_DIR.to_string(),
            },
        },
        autoupdate: Autoupdate {
            architecture: Architecture {
                x64: Artifact {
                    url: "https://github.com/aria2/aria2/releases/download/release-$matchVersion/aria2-$matchVersion-win-64bit-build$matchBuild.zip"
                        .to_string(),
                    extract_dir: "aria2-$matchVersion-win-64bit-build$matchBuild".to_string(),
                    ..Default::default()
                },
            },
        },
        ..Default::default()
    };

    let mgr = test_manager(root.path()).use_checkver(true).github_api_base(api);
    let err = mgr.update(APP, &manifest).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::ManifestIncomplete));
    assert!(err.to_string().contains("no verifiable hash"));

    // Discovery failed before the transaction touched the app subtree.
    assert!(!root.path().join("apps").join(APP).exists());
}

#[tokio::test]
async fn relaunch_failure_rolls_back_to_previous_target() {
    let root = TempDir::new().unwrap();
    let app_dir = root.path().join("apps").join(APP);
    let old_version_dir = app_dir.join("v1.0.0");
    std::fs::create_dir_all(&old_version_dir).unwrap();
    std::fs::write(old_version_dir.join(BIN), "old").unwrap();
    let current_path = app_dir.join("current");
    switch::switch_current(&current_path, &old_version_dir).unwrap();

    let zip = aria2_zip();
    let hash = sha256_hex(&zip);
    let base = serve_bytes(zip).await;
    let manifest = aria2_manifest(format!("{base}/aria2.zip"), hash);

    let mgr = test_manager(root.path())
        .relaunch(true)
        .with_launcher(|_| anyhow::bail!("launch failed"));
    let err = mgr.update(APP, &manifest).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::SwitchHealthcheck));
    assert!(err.to_string().contains("relaunch failed"));

    assert_eq!(
        switch::resolve_current_target(&current_path).unwrap(),
        Some(old_version_dir)
    );
    let state = read_state(root.path());
    assert_eq!(state.last_error_code, "SWITCH_HEALTHCHECK");
    assert_eq!(state.pending_version, "");

    let events = read_events(root.path());
    assert!(events.contains("\"event\":\"SWITCH_HEALTHCHECK_FAILED\""));
    assert!(events.contains("\"event\":\"SWITCH_ROLLBACK_DONE\""));
}

#[tokio::test]
async fn supervisor_escalates_from_graceful_to_force_kill() {
    let root = TempDir::new().unwrap();
    let mut mgr = test_manager(root.path()).stop_timeout(Duration::from_millis(1));

    let find_calls = Arc::new(Mutex::new(0u32));
    let calls = find_calls.clone();
    mgr.find_pids = Box::new(move |_prefix| {
        let mut count = calls.lock().unwrap();
        *count += 1;
        if *count == 1 {
            Ok(vec![101, 202])
        } else {
            Ok(vec![202])
        }
    });

    let graceful = Arc::new(Mutex::new(Vec::new()));
    let graceful_rec = graceful.clone();
    mgr.close_pid = Box::new(move |pid| {
        graceful_rec.lock().unwrap().push(pid);
        Ok(())
    });

    let soft = Arc::new(Mutex::new(Vec::new()));
    let forced = Arc::new(Mutex::new(Vec::new()));
    let soft_rec = soft.clone();
    let forced_rec = forced.clone();
    mgr.kill_pid = Box::new(move |pid, force| {
        if force {
            forced_rec.lock().unwrap().push(pid);
        } else {
            soft_rec.lock().unwrap().push(pid);
        }
        Ok(())
    });

    mgr.terminate_processes(APP, Path::new("/apps/aria2/current"))
        .await
        .unwrap();

    assert_eq!(*graceful.lock().unwrap(), vec![101, 202]);
    assert_eq!(*soft.lock().unwrap(), vec![101, 202]);
    assert_eq!(*forced.lock().unwrap(), vec![202]);

    let events = read_events(root.path());
    assert!(events.contains("\"event\":\"SWITCH_PROCESS_FOUND\""));
    assert!(events.contains("matched_pids=2"));
    assert!(events.contains("\"event\":\"SWITCH_PROCESS_SOFT_KILL\""));
    assert!(events.contains("\"event\":\"SWITCH_PROCESS_FORCE_KILL\""));
    assert!(events.contains("pid=202"));
}

#[tokio::test]
async fn force_kill_failure_is_fatal() {
    let root = TempDir::new().unwrap();
    let mut mgr = test_manager(root.path()).stop_timeout(Duration::from_millis(1));
    mgr.find_pids = Box::new(|_| Ok(vec![303]));
    mgr.close_pid = Box::new(|_| Ok(()));
    mgr.kill_pid = Box::new(|pid, force| {
        if force {
            anyhow::bail!("access denied killing pid {pid}")
        }
        Ok(())
    });

    let err = mgr
        .terminate_processes(APP, Path::new("/apps/aria2/current"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("access denied"));
    assert!(read_events(root.path()).contains("\"event\":\"SWITCH_PROCESS_FORCE_FAILED\""));
}

#[tokio::test]
async fn stale_lock_is_recovered_by_a_new_transaction() {
    let root = TempDir::new().unwrap();
    let app_dir = root.path().join("apps").join(APP);
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(
        app_dir.join(".lock"),
        r#"{"pid":42424242,"created_at":"2026-02-27T11:00:00Z"}"#,
    )
    .unwrap();

    let zip = aria2_zip();
    let hash = sha256_hex(&zip);
    let base = serve_bytes(zip).await;
    let manifest = aria2_manifest(format!("{base}/aria2.zip"), hash);

    let mut mgr = test_manager(root.path());
    mgr.pid_alive = Box::new(|_| false);
    mgr.update(APP, &manifest).await.unwrap();
    assert_eq!(read_state(root.path()).current_version, VERSION);
    assert!(!app_dir.join(".lock").exists());
}

#[tokio::test]
async fn live_lock_holder_blocks_the_transaction() {
    let root = TempDir::new().unwrap();
    let app_dir = root.path().join("apps").join(APP);
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(
        app_dir.join(".lock"),
        r#"{"pid":100,"created_at":"2026-02-27T11:00:00Z"}"#,
    )
    .unwrap();

    let manifest = aria2_manifest(
        "https://example.invalid/aria2.zip".to_string(),
        "67d015301eef0b612191212d564c5bb0a14b5b9c4796b76454276a4d28d9b288".to_string(),
    );

    let mut mgr = test_manager(root.path());
    mgr.pid_alive = Box::new(|_| true);
    let err = mgr.update(APP, &manifest).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::AlreadyRunning));
    assert!(err.to_string().contains("update already running"));
    // The holder's lock file is left alone.
    assert!(app_dir.join(".lock").exists());
}

#[tokio::test]
async fn retention_sweep_runs_after_a_successful_switch() {
    let root = TempDir::new().unwrap();
    let app_dir = root.path().join("apps").join(APP);
    for name in ["v1.0.0", "v1.1.0", "v1.2.0"] {
        std::fs::create_dir_all(app_dir.join(name)).unwrap();
        std::thread::sleep(Duration::from_millis(15));
    }

    let zip = aria2_zip();
    let hash = sha256_hex(&zip);
    let base = serve_bytes(zip).await;
    let manifest = aria2_manifest(format!("{base}/aria2.zip"), hash);

    let mgr = test_manager(root.path()).keep_versions(1);
    mgr.update(APP, &manifest).await.unwrap();

    assert!(app_dir.join(format!("v{VERSION}")).exists());
    assert!(app_dir.join("v1.2.0").exists());
    assert!(!app_dir.join("v1.1.0").exists());
    assert!(!app_dir.join("v1.0.0").exists());
}

#[tokio::test]
async fn fast_path_skips_network_but_still_collects_garbage() {
    let root = TempDir::new().unwrap();
    let app_dir = root.path().join("apps").join(APP);
    std::fs::create_dir_all(app_dir.join(format!("v{VERSION}"))).unwrap();
    std::fs::create_dir_all(app_dir.join("v0.9.0")).unwrap();
    std::thread::sleep(Duration::from_millis(15));
    std::fs::create_dir_all(app_dir.join("v1.0.0")).unwrap();
    state::save_state(
        &app_dir.join("runtime.json"),
        &RuntimeState {
            current_version: VERSION.to_string(),
            pending_version: "stale".to_string(),
            ..Default::default()
        },
    )
    .unwrap();

    // The URL is unreachable; the fast path must never touch it.
    let manifest = aria2_manifest(
        "https://example.invalid/aria2.zip".to_string(),
        "67d015301eef0b612191212d564c5bb0a14b5b9c4796b76454276a4d28d9b288".to_string(),
    );

    let mgr = test_manager(root.path()).keep_versions(1);
    mgr.update(APP, &manifest).await.unwrap();

    let state = read_state(root.path());
    assert_eq!(state.current_version, VERSION);
    assert_eq!(state.pending_version, "");
    assert!(app_dir.join("v1.0.0").exists());
    assert!(!app_dir.join("v0.9.0").exists());
    assert!(read_events(root.path()).contains("\"event\":\"UPDATE_DONE\""));
}

#[tokio::test]
async fn running_twice_is_idempotent_beyond_gc() {
    let root = TempDir::new().unwrap();
    let zip = aria2_zip();
    let hash = sha256_hex(&zip);
    let base = serve_bytes(zip).await;
    let manifest = aria2_manifest(format!("{base}/aria2.zip"), hash);

    let mgr = test_manager(root.path());
    mgr.update(APP, &manifest).await.unwrap();
    let first = read_state(root.path());
    mgr.update(APP, &manifest).await.unwrap();
    let second = read_state(root.path());

    assert_eq!(first.current_version, second.current_version);
    let app_dir = root.path().join("apps").join(APP);
    assert!(app_dir.join(format!("v{VERSION}")).join(BIN).is_file());
    assert_eq!(
        switch::resolve_current_target(&app_dir.join("current")).unwrap(),
        Some(app_dir.join(format!("v{VERSION}")))
    );
}

#[tokio::test]
async fn declined_confirmation_exits_cleanly_without_switching() {
    let root = TempDir::new().unwrap();
    let zip = aria2_zip();
    let hash = sha256_hex(&zip);
    let base = serve_bytes(zip).await;
    let manifest = aria2_manifest(format!("{base}/aria2.zip"), hash);

    let mgr = test_manager(root.path())
        .prompt_switch(true)
        .with_confirm(|_, _| Ok(false));
    mgr.update(APP, &manifest).await.unwrap();

    let app_dir = root.path().join("apps").join(APP);
    // Staged payload was committed, but current was never flipped.
    assert!(app_dir.join(format!("v{VERSION}")).join(BIN).is_file());
    assert!(!app_dir.join("current").exists());

    let state = read_state(root.path());
    assert_eq!(state.current_version, "");
    assert_eq!(state.pending_version, "");
    assert!(read_events(root.path()).contains("\"event\":\"SWITCH_USER_DECLINED\""));
}

#[tokio::test]
async fn confirmation_error_records_switch_prompt() {
    let root = TempDir::new().unwrap();
    let zip = aria2_zip();
    let hash = sha256_hex(&zip);
    let base = serve_bytes(zip).await;
    let manifest = aria2_manifest(format!("{base}/aria2.zip"), hash);

    let mgr = test_manager(root.path())
        .prompt_switch(true)
        .with_confirm(|_, _| anyhow::bail!("dialog unavailable"));
    let err = mgr.update(APP, &manifest).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::SwitchPrompt));
    assert_eq!(read_state(root.path()).last_error_code, "SWITCH_PROMPT");
}

#[tokio::test]
async fn missing_extract_dir_records_pkg_extract() {
    let root = TempDir::new().unwrap();
    let zip = build_zip(&[("somewhere-else/app.exe", "binary")]);
    let hash = sha256_hex(&zip);
    let base = serve_bytes(zip).await;
    let manifest = aria2_manifest(format!("{base}/aria2.zip"), hash);

    let mgr = test_manager(root.path());
    let err = mgr.update(APP, &manifest).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::PkgExtract));
    assert!(err.to_string().contains("source extract directory missing"));
    assert_eq!(read_state(root.path()).last_error_code, "PKG_EXTRACT");
}

#[tokio::test]
async fn discovery_rewrites_and_installs_newer_version() {
    let root = TempDir::new().unwrap();
    let zip = build_zip(&[("aria2-1.38.0-win-64bit-build1/aria2c.exe", "newer binary")]);
    let hash = sha256_hex(&zip);
    let download_base = serve_bytes(zip).await;

    // The release asset matches the regex; the manifest's autoupdate URL
    // template points at the fixture download server.
    let api = serve_json(
        "/repos/aria2/aria2/releases/latest",
        r#"{
            "tag_name": "release-1.38.0",
            "assets": [
                {"browser_download_url": "https://github.com/aria2/aria2/releases/download/release-1.38.0/aria2-1.38.0-win-64bit-build1.zip",
                 "name": "aria2-1.38.0-win-64bit-build1.zip"}
            ]
        }"#
        .to_string(),
    )
    .await;

    let manifest = Manifest {
        version: VERSION.to_string(),
        bin: BIN.to_string(),
        hash: hash.clone(),
        checkver: crate::manifest::Checkver {
            github: "https://github.com/aria2/aria2".to_string(),
            regex: r"/release-(?:[\d.]+)/aria2-(?<version>[\d.]+)-win-64bit-build(?<build>\d+)\.zip"
                .to_string(),
            replace: "${version}-${build}".to_string(),
        },
        autoupdate: Autoupdate {
            architecture: Architecture {
                x64: Artifact {
                    url: format!("{download_base}/aria2-$matchVersion-win-64bit-build$matchBuild.zip"),
                    extract_dir: "aria2-$matchVersion-win-64bit-build$matchBuild".to_string(),
                    ..Default::default()
                },
            },
        },
        ..Default::default()
    };

    let mgr = test_manager(root.path()).use_checkver(true).github_api_base(api);
    mgr.update(APP, &manifest).await.unwrap();

    let state = read_state(root.path());
    assert_eq!(state.current_version, "1.38.0-1");
    assert!(root
        .path()
        .join("apps")
        .join(APP)
        .join("v1.38.0-1")
        .join(BIN)
        .is_file());
}
