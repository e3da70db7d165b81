use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn daybook(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("daybook").unwrap();
    cmd.env_remove("DAYBOOK_HOME")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .arg("--home")
        .arg(home.path());
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.arg("--output").arg("json").output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

/// Config pointing the backend at a port nothing listens on.
fn write_unreachable_config(home: &TempDir) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    std::fs::write(
        home.path().join("config.yaml"),
        format!("sync:\n  api_base_url: http://127.0.0.1:{port}/api\nconnectivity:\n  probe_timeout_ms: 500\n"),
    )
    .unwrap();
}

#[test]
fn test_add_then_status_and_list() {
    let home = TempDir::new().unwrap();

    daybook(&home)
        .args(["--offline", "add", "create", "task", r#"{"title":"Buy milk"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued create task"));

    let status = json_output(daybook(&home).args(["--offline", "status"]));
    assert_eq!(status["status"]["pending_count"], 1);
    assert_eq!(status["status"]["connectivity"], "offline");

    let list = json_output(daybook(&home).arg("list"));
    assert_eq!(list["count"], 1);
    assert_eq!(list["items"][0]["entity"], "task");
    assert_eq!(list["items"][0]["data"]["title"], "Buy milk");
    assert_eq!(list["items"][0]["retryCount"], 0);
}

#[test]
fn test_queue_survives_between_runs_in_order() {
    let home = TempDir::new().unwrap();

    for (kind, domain, payload) in [
        ("create", "habit", r#"{"name":"Stretch"}"#),
        ("update", "mood", r#"{"id":"m-1","score":4}"#),
        ("delete", "calendar-event", r#"{"id":"ev-9"}"#),
    ] {
        daybook(&home).args(["add", kind, domain, payload]).assert().success();
    }

    let list = json_output(daybook(&home).arg("list"));
    let kinds: Vec<_> = list["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, ["create", "update", "delete"]);
}

#[test]
fn test_add_rejects_unknown_domain() {
    let home = TempDir::new().unwrap();

    daybook(&home)
        .args(["add", "create", "recipe", "{}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown target domain: recipe"));
}

#[test]
fn test_sync_offline_is_skipped() {
    let home = TempDir::new().unwrap();
    daybook(&home)
        .args(["add", "create", "journal", r#"{"body":"Quiet day"}"#])
        .assert()
        .success();

    daybook(&home)
        .args(["--offline", "sync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sync skipped: offline."));

    let list = json_output(daybook(&home).arg("list"));
    assert_eq!(list["count"], 1);
}

#[test]
fn test_sync_with_unreachable_backend_keeps_queue() {
    let home = TempDir::new().unwrap();
    write_unreachable_config(&home);
    daybook(&home)
        .args(["add", "update", "task", r#"{"id":"t-1","done":true}"#])
        .assert()
        .success();

    let outcome = json_output(daybook(&home).arg("sync"));
    assert_eq!(outcome["outcome"], "skipped");
    assert_eq!(outcome["reason"], "offline");

    let status = json_output(daybook(&home).arg("status"));
    assert_eq!(status["status"]["pending_count"], 1);
}

#[test]
fn test_clear_pending_needs_force() {
    let home = TempDir::new().unwrap();
    daybook(&home)
        .args(["add", "create", "task", r#"{"title":"x"}"#])
        .assert()
        .success();

    daybook(&home)
        .arg("clear")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    daybook(&home)
        .args(["clear", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1 pending changes"));
}

#[test]
fn test_retry_unknown_id_fails() {
    let home = TempDir::new().unwrap();

    daybook(&home)
        .args(["retry", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    daybook(&home)
        .arg("retry")
        .assert()
        .success()
        .stdout(predicate::str::contains("No failed changes to retry."));
}

#[test]
fn test_invalid_config_is_reported() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("config.yaml"), "sync:\n  max_retries: 0\n").unwrap();

    daybook(&home)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_retries"));
}
