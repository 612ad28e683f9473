//! E2E workflow for `fl init` + `fl ingest` + record inspection.
//!
//! Scenarios:
//! - the same notice twice lands on one record with counter 2
//! - legacy YAML and v2 XML for the same error share the record
//! - closing a record and ingesting again reopens it
//! - wrong api key, unknown project and malformed body fail with the
//!   endpoint's status and message, and leave the store untouched

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const V2_NOTICE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<notice version="2.0">
  <api-key>---
:api_key: s3cret
:project: shop
:tracker: Bug
</api-key>
  <error>
    <class>ZeroDivisionError</class>
    <message>ZeroDivisionError: divided by 0</message>
    <backtrace>
      <line method="average" file="[PROJECT_ROOT]/app/models/report.rb" number="27"/>
      <line method="index" file="[PROJECT_ROOT]/app/controllers/reports_controller.rb" number="8"/>
    </backtrace>
  </error>
  <request>
    <url>https://shop.example/reports</url>
  </request>
</notice>
"#;

const LEGACY_NOTICE: &str = "notice:
  api_key: \"--- \\n:api_key: s3cret\\n:project: shop\\n:tracker: Bug\\n\"
  error_class: ZeroDivisionError
  error_message: \"ZeroDivisionError: divided by 0\"
  backtrace:
    - \"[PROJECT_ROOT]/app/models/report.rb:27:in `average'\"
    - \"[PROJECT_ROOT]/app/controllers/reports_controller.rb:8:in `index'\"
  request:
    url: https://shop.example/reports
";

fn fl_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("fl"));
    cmd.current_dir(dir);
    cmd.env("FAULTLINE_LOG", "error");
    cmd.env_remove("FAULTLINE_CONFIG");
    cmd.env_remove("FORMAT");
    // Keep a developer's own user-level config out of discovery.
    cmd.env("XDG_CONFIG_HOME", dir.join(".xdg"));
    cmd
}

fn init_project(dir: &Path) {
    fl_cmd(dir)
        .args(["init", "--api-key", "s3cret", "--project", "shop", "--json"])
        .assert()
        .success();
    assert!(dir.join(".faultline/config.toml").is_file());
    assert!(dir.join(".faultline/faultline.db").is_file());
}

fn ingest(dir: &Path, body: &str, legacy: bool) -> (bool, Value) {
    let file = dir.join(if legacy { "notice.yml" } else { "notice.xml" });
    fs::write(&file, body).expect("write notice");
    let mut cmd = fl_cmd(dir);
    cmd.args(["ingest", "--json", "--file"]).arg(&file);
    if legacy {
        cmd.arg("--legacy");
    }
    let output = cmd.output().expect("ingest should not crash");
    let report: Value = serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "ingest printed invalid JSON ({err}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (output.status.success(), report)
}

fn list_records(dir: &Path) -> Vec<Value> {
    let output = fl_cmd(dir)
        .args(["list", "--json"])
        .output()
        .expect("list should not crash");
    assert!(
        output.status.success(),
        "list failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let response: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    response["records"].as_array().cloned().unwrap_or_default()
}

fn show_record(dir: &Path, id: i64) -> Value {
    let output = fl_cmd(dir)
        .args(["show", &id.to_string(), "--json"])
        .output()
        .expect("show should not crash");
    assert!(
        output.status.success(),
        "show failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

#[test]
fn repeated_notice_is_one_record() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());

    let (ok, first) = ingest(dir.path(), V2_NOTICE, false);
    assert!(ok, "{first}");
    assert_eq!(first["status"], 200);
    let id = first["record_id"].as_i64().expect("record id");
    assert_eq!(
        first["body"],
        format!("Received bug report.\n<error-id>{id}</error-id>\n<id>{id}</id>")
    );

    let (ok, second) = ingest(dir.path(), V2_NOTICE, false);
    assert!(ok, "{second}");
    assert_eq!(second["record_id"], id);

    let records = list_records(dir.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["occurrences"], 2);
    assert_eq!(
        records[0]["subject"],
        "ZeroDivisionError in app/models/report.rb:27"
    );

    let record = show_record(dir.path(), id);
    assert_eq!(record["journal"].as_array().map(Vec::len), Some(2));
    assert_eq!(record["attributes"]["Error class"], "ZeroDivisionError");
    assert_eq!(record["status"]["name"], "New");
}

#[test]
fn legacy_and_v2_share_a_record() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());

    let (ok, v2) = ingest(dir.path(), V2_NOTICE, false);
    assert!(ok, "{v2}");
    let (ok, legacy) = ingest(dir.path(), LEGACY_NOTICE, true);
    assert!(ok, "{legacy}");
    assert_eq!(v2["record_id"], legacy["record_id"]);
    assert_eq!(list_records(dir.path())[0]["occurrences"], 2);
}

#[test]
fn closed_record_is_reopened_by_next_notice() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());

    let (_, first) = ingest(dir.path(), V2_NOTICE, false);
    let id = first["record_id"].as_i64().expect("record id");

    fl_cmd(dir.path())
        .args(["close", &id.to_string(), "--json"])
        .assert()
        .success();
    assert_eq!(show_record(dir.path(), id)["status"]["is_closed"], true);

    let (ok, _) = ingest(dir.path(), V2_NOTICE, false);
    assert!(ok);
    let record = show_record(dir.path(), id);
    assert_eq!(record["status"]["name"], "New");
    assert_eq!(record["status"]["is_closed"], false);
    assert_eq!(record["journal"][1]["status_change"], "New");
}

#[test]
fn rejected_notices_report_status_and_touch_nothing() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());

    let (ok, denied) = ingest(dir.path(), &V2_NOTICE.replace("s3cret", "guess"), false);
    assert!(!ok);
    assert_eq!(denied["status"], 403);
    assert_eq!(
        denied["body"],
        "Access denied. Notice API is disabled or key is invalid."
    );

    let (ok, missing) = ingest(
        dir.path(),
        &V2_NOTICE.replace(":project: shop", ":project: blog"),
        false,
    );
    assert!(!ok);
    assert_eq!(missing["status"], 404);
    assert_eq!(missing["body"], "could not log error, project blog not found.");

    let (ok, malformed) = ingest(dir.path(), "<notice><error>", false);
    assert!(!ok);
    assert_eq!(malformed["status"], 400);

    assert!(list_records(dir.path()).is_empty());
}

#[test]
fn ingest_reads_stdin() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());

    fl_cmd(dir.path())
        .args(["ingest", "--legacy", "--format", "text"])
        .write_stdin(LEGACY_NOTICE)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("200\nReceived bug report."));
}

#[test]
fn show_unknown_record_fails_with_code() {
    let dir = TempDir::new().expect("tempdir");
    init_project(dir.path());

    fl_cmd(dir.path())
        .args(["show", "999", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error_code\": \"E4003\""));
}

#[test]
fn commands_outside_a_project_use_defaults() {
    let dir = TempDir::new().expect("tempdir");

    fl_cmd(dir.path())
        .args(["config", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"api_key_set\": false"));

    let (ok, report) = ingest(dir.path(), V2_NOTICE, false);
    assert!(!ok);
    assert_eq!(report["status"], 403);
}
