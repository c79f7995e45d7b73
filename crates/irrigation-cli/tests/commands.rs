//! End-to-end CLI tests: each subcommand against temporary config, signal and data files.

use assert_cmd::Command;
use irrigation_test_util::normalize_nondeterministic;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r#"
[[consumers]]
id = "phase-5"
signal_types = ["SCORING_PRIMARY"]
scopes = ["Q*"]
"#;

const SIGNALS: &str = r#"
# one routable signal, one with an unknown scope
{"signal_type": "SCORING_PRIMARY", "source_phase": 4, "target_scopes": ["Q042", "PA02"], "payload": {"score": 0.8, "page": 12}}
{"signal_id": "sig-fixed", "signal_type": "SCORING_PRIMARY", "source_phase": 4, "target_scopes": ["Q999"]}
"#;

#[allow(deprecated)]
fn irrigation_cmd() -> Command {
    Command::cargo_bin("irrigation").expect("irrigation binary not found - run `cargo build` first")
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        std::fs::write(dir.path().join("irrigation.toml"), CONFIG).expect("write config");
        std::fs::write(dir.path().join("signals.jsonl"), SIGNALS).expect("write signals");
        Self { dir }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> Command {
        let mut cmd = irrigation_cmd();
        cmd.current_dir(self.dir.path());
        cmd
    }

    fn replay_into_data_dir(&self) {
        self.cmd()
            .args(["replay", "--signals", "signals.jsonl", "--data-dir", "data"])
            .assert()
            .success();
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn tamper(path: &Path) {
    let text = std::fs::read_to_string(path).expect("read ledger");
    let tampered = text.replacen("\"source_phase\":4", "\"source_phase\":5", 1);
    assert_ne!(text, tampered, "ledger should contain a source_phase field");
    std::fs::write(path, tampered).expect("write ledger");
}

#[test]
fn config_check_prints_the_default_profile_without_a_file() {
    let dir = TempDir::new().unwrap();
    let output = irrigation_cmd()
        .current_dir(dir.path())
        .args(["config", "check"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["effective"]["profile"], "standard");
    assert_eq!(report["effective"]["value_add"]["threshold"], 0.3);
    assert_eq!(report["consumers"], Value::Array(Vec::new()));
    assert!(report.get("data_dir").is_none());
}

#[test]
fn config_check_applies_profile_and_lists_consumers() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["config", "check", "--profile", "strict", "--data-dir", "var"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["effective"]["profile"], "strict");
    assert_eq!(report["effective"]["dispatch"]["ack_policy"], "all");
    assert_eq!(report["data_dir"], "var");
    assert_eq!(report["consumers"][0]["consumer_id"], "phase-5");
    assert_eq!(report["consumers"][0]["signal_types"][0], "SCORING_PRIMARY");
}

#[test]
fn config_check_rejects_unknown_profile() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "check", "--profile", "chaotic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown profile: chaotic"));
}

#[test]
fn explain_known_code() {
    irrigation_cmd()
        .args(["explain", "rate_limited"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(RATE_LIMITED)"))
        .stdout(predicate::str::contains("Retryable: yes"));
}

#[test]
fn explain_unknown_code_lists_the_available_ones() {
    irrigation_cmd()
        .args(["explain", "NOT_A_CODE"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown reason code: NOT_A_CODE"))
        .stderr(predicate::str::contains("SCOPE_NOT_FOUND"));
}

#[test]
fn catalog_lists_every_signal_type() {
    let output = irrigation_cmd().arg("catalog").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert_eq!(text.lines().count(), 18);
    assert!(text.contains("ENRICHMENT_METADATA"));

    let output = irrigation_cmd().args(["catalog", "--json"]).output().unwrap();
    let rows = stdout_json(&output);
    assert_eq!(rows.as_array().map(Vec::len), Some(17));
}

#[test]
fn empty_data_dir_has_no_dead_letters() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["dead-letters", "list", "--data-dir", "data"])
        .output()
        .unwrap();
    assert!(output.status.success());
    insta::assert_snapshot!(String::from_utf8(output.stdout).unwrap(), @"no dead letters");
}

#[test]
fn empty_data_dir_verifies_as_intact() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["audit", "verify", "--data-dir", "data"])
        .output()
        .unwrap();
    assert!(output.status.success());
    insta::assert_snapshot!(String::from_utf8(output.stdout).unwrap(), @r#"
    {
      "verdict": "intact",
      "entries": 0
    }
    "#);
}

#[test]
fn replay_prints_statuses_and_metrics() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["replay", "--signals", "signals.jsonl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sig-fixed DEAD_LETTER SCOPE_NOT_FOUND"))
        .stdout(predicate::str::contains("submitted=2 dispatched=1 delivered=1"));
}

#[test]
fn replay_json_is_stable_after_normalization() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["replay", "--signals", "signals.jsonl", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let out = normalize_nondeterministic(stdout_json(&output));
    let statuses = out["statuses"].as_array().unwrap();
    assert_eq!(statuses.len(), 2);

    assert_eq!(statuses[0]["signal_id"], "__SIGNAL_ID__");
    assert_eq!(statuses[0]["state"], "ACKNOWLEDGED");
    assert_eq!(statuses[0]["audit"]["hash"], "__HASH__");
    assert_eq!(statuses[0]["deliveries"][0]["consumer_id"], "phase-5");

    assert_eq!(statuses[1]["signal_id"], "sig-fixed");
    assert_eq!(statuses[1]["code"], "SCOPE_NOT_FOUND");
    let states: Vec<&str> = statuses[1]["history"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["state"].as_str())
        .collect();
    assert_eq!(states, ["CREATED", "VALIDATING", "REJECTED", "DEAD_LETTER"]);
    assert_eq!(statuses[1]["history"][0]["at"], "__TIMESTAMP__");

    assert_eq!(out["metrics"]["submitted"], 2);
    assert_eq!(out["metrics"]["rejected"], 1);
}

#[test]
fn replay_into_data_dir_then_verify_list_and_purge() {
    let ws = Workspace::new();
    ws.replay_into_data_dir();

    let output = ws
        .cmd()
        .args(["audit", "verify", "--data-dir", "data"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output),
        serde_json::json!({"verdict": "intact", "entries": 2})
    );

    ws.cmd()
        .args(["dead-letters", "list", "--data-dir", "data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sig-fixed SCOPE_NOT_FOUND"));

    ws.cmd()
        .args(["dead-letters", "purge", "--data-dir", "data", "--signal", "sig-fixed"])
        .assert()
        .success()
        .stdout("purged 1 dead letter(s)\n");

    ws.cmd()
        .args(["dead-letters", "list", "--data-dir", "data", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn tampered_ledger_exits_two() {
    let ws = Workspace::new();
    ws.replay_into_data_dir();
    tamper(&ws.path("data").join("audit.jsonl"));

    let output = ws
        .cmd()
        .args(["audit", "verify", "--data-dir", "data"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(stdout_json(&output)["verdict"], "tampered");
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("audit ledger tampered"),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn purge_requires_a_selection() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["dead-letters", "purge", "--data-dir", "data"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn replay_reports_the_bad_line() {
    let ws = Workspace::new();
    std::fs::write(ws.path("bad.jsonl"), "{\"signal_type\": \"NOPE\"}\n").unwrap();
    ws.cmd()
        .args(["replay", "--signals", "bad.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("signals line 1"));
}
