#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn prdloop(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("prdloop").unwrap();
    cmd.current_dir(dir.path()).env("PRDLOOP_ROOT", dir.path());
    cmd
}

fn init_project(dir: &TempDir) {
    prdloop(dir).arg("init").assert().success();
}

fn write_backlog(dir: &TempDir, json: &str) {
    std::fs::create_dir_all(dir.path().join(".prdloop")).unwrap();
    std::fs::write(dir.path().join(".prdloop/prd.json"), json).unwrap();
}

/// A minimal backlog that validates with zero warnings.
const CLEAN_BACKLOG: &str = r#"{
  "project": {"name": "demo", "description": "A demo project"},
  "stories": [
    {
      "id": "US-001",
      "title": "First story",
      "acceptanceCriteria": ["typecheck passes"]
    },
    {
      "id": "US-002",
      "title": "Second story",
      "acceptanceCriteria": ["typecheck passes"]
    }
  ]
}"#;

/// Install a stub agent script and a config pointing at it.
fn write_agent_config(dir: &TempDir, script_body: &str) {
    let script = dir.path().join("fake-agent.sh");
    std::fs::write(&script, script_body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    std::fs::create_dir_all(dir.path().join(".prdloop")).unwrap();
    let config = serde_json::json!({
        "version": 1,
        "agent": {
            "executable": script.to_string_lossy(),
            "model": "",
            "skipConfirmations": true,
            "iterationTimeoutSeconds": 60
        },
        "limits": {
            "maxIterations": 10,
            "maxFailures": 2,
            "pauseSeconds": 0
        },
        "git": {
            "autoCommit": false,
            "commitMessageFormat": "feat: {story_id} - {story_title}"
        },
        "gates": []
    });
    std::fs::write(
        dir.path().join(".prdloop/config.json"),
        serde_json::to_string_pretty(&config).unwrap(),
    )
    .unwrap();
}

// ---------------------------------------------------------------------------
// prdloop init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_project_files() {
    let dir = TempDir::new().unwrap();
    prdloop(&dir).arg("init").assert().success();

    assert!(dir.path().join(".prdloop").is_dir());
    assert!(dir.path().join(".prdloop/config.json").exists());
    assert!(dir.path().join(".prdloop/prd.json").exists());
    assert!(dir.path().join(".prdloop/progress.md").exists());
    assert!(dir.path().join(".prdloop/guardrails.md").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    prdloop(&dir).arg("init").assert().success();
    prdloop(&dir).arg("init").assert().success();
}

#[test]
fn init_does_not_overwrite_existing_backlog() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);
    prdloop(&dir).arg("init").assert().success();

    let content = std::fs::read_to_string(dir.path().join(".prdloop/prd.json")).unwrap();
    assert!(content.contains("US-001"));
}

#[test]
fn init_detect_seeds_gates_for_node_project() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("package.json"),
        r#"{"name": "x", "scripts": {"typecheck": "tsc", "test": "vitest"}}"#,
    )
    .unwrap();

    prdloop(&dir)
        .args(["init", "--detect"])
        .assert()
        .success()
        .stdout(predicate::str::contains("detected"));

    let config = std::fs::read_to_string(dir.path().join(".prdloop/config.json")).unwrap();
    assert!(config.contains("typecheck"));
}

// ---------------------------------------------------------------------------
// prdloop validate
// ---------------------------------------------------------------------------

#[test]
fn validate_clean_backlog_succeeds() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);

    prdloop(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("backlog is valid"));
}

#[test]
fn validate_duplicate_id_fails() {
    let dir = TempDir::new().unwrap();
    write_backlog(
        &dir,
        r#"{
          "project": {"name": "demo", "description": "d"},
          "stories": [
            {"id": "US-001", "title": "a", "acceptanceCriteria": ["typecheck"]},
            {"id": "US-001", "title": "b", "acceptanceCriteria": ["typecheck"]}
          ]
        }"#,
    );

    prdloop(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[DUPLICATE_ID]"))
        .stderr(predicate::str::contains("backlog invalid"));
}

#[test]
fn validate_missing_stories_fails() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, r#"{"project": {"name": "demo", "description": "d"}}"#);

    prdloop(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[MISSING_STORIES]"));
}

#[test]
fn validate_circular_dependency_reports_cycle_path() {
    let dir = TempDir::new().unwrap();
    write_backlog(
        &dir,
        r#"{
          "project": {"name": "demo", "description": "d"},
          "stories": [
            {"id": "US-001", "title": "a", "dependencies": ["US-002"], "acceptanceCriteria": ["typecheck"]},
            {"id": "US-002", "title": "b", "dependencies": ["US-001"], "acceptanceCriteria": ["typecheck"]}
          ]
        }"#,
    );

    prdloop(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[CIRCULAR_DEPENDENCY]"))
        .stdout(predicate::str::contains("US-001"));
}

#[test]
fn validate_strict_fails_on_warnings() {
    let dir = TempDir::new().unwrap();
    // No acceptance criteria — a warning, not an error.
    write_backlog(
        &dir,
        r#"{
          "project": {"name": "demo", "description": "d"},
          "stories": [{"id": "US-001", "title": "a"}]
        }"#,
    );

    prdloop(&dir).arg("validate").assert().success();
    prdloop(&dir)
        .args(["validate", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("warning"));
}

#[test]
fn validate_json_output_has_expected_fields() {
    let dir = TempDir::new().unwrap();
    write_backlog(
        &dir,
        r#"{
          "project": {"name": "demo", "description": "d"},
          "stories": [
            {"id": "US-001", "title": "a", "acceptanceCriteria": ["typecheck"]},
            {"id": "US-001", "title": "b", "acceptanceCriteria": ["typecheck"]}
          ]
        }"#,
    );

    let out = prdloop(&dir)
        .args(["--json", "validate"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["valid"], false);
    assert_eq!(v["errors"][0]["code"], "DUPLICATE_ID");
    assert_eq!(v["errors"][0]["storyId"], "US-001");
}

// ---------------------------------------------------------------------------
// prdloop status
// ---------------------------------------------------------------------------

#[test]
fn status_shows_phase_table() {
    let dir = TempDir::new().unwrap();
    write_backlog(
        &dir,
        r#"{
          "project": {"name": "demo", "description": "d"},
          "phases": [{"number": 1, "name": "Foundation"}],
          "stories": [
            {"id": "US-001", "title": "a", "phase": 1, "status": "complete"},
            {"id": "US-002", "title": "b", "phase": 1}
          ]
        }"#,
    );

    prdloop(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("Foundation"))
        .stdout(predicate::str::contains("1/2 stories complete"));
}

#[test]
fn status_json_counts() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);

    let out = prdloop(&dir)
        .args(["--json", "status"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["project"], "demo");
    assert_eq!(v["totalStories"], 2);
    assert_eq!(v["completedStories"], 0);
}

// ---------------------------------------------------------------------------
// prdloop skip / start / close-phase / clear-stale
// ---------------------------------------------------------------------------

#[test]
fn skip_marks_story_skipped() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);

    prdloop(&dir)
        .args(["skip", "US-001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped US-001"));

    let content = std::fs::read_to_string(dir.path().join(".prdloop/prd.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(v["stories"][0]["status"], "skipped");
    assert!(v["stories"][0]["skippedAt"].is_string());
}

#[test]
fn skip_unknown_story_fails() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);

    prdloop(&dir).args(["skip", "US-999"]).assert().failure();
}

#[test]
fn start_marks_story_in_progress() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);

    prdloop(&dir).args(["start", "US-002"]).assert().success();

    let content = std::fs::read_to_string(dir.path().join(".prdloop/prd.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(v["stories"][1]["status"], "in_progress");
    assert!(v["stories"][1]["startedAt"].is_string());
}

#[test]
fn close_phase_skips_open_stories() {
    let dir = TempDir::new().unwrap();
    write_backlog(
        &dir,
        r#"{
          "project": {"name": "demo", "description": "d"},
          "phases": [{"number": 1, "name": "One"}],
          "stories": [
            {"id": "US-001", "title": "done", "phase": 1, "status": "complete"},
            {"id": "US-002", "title": "open", "phase": 1}
          ]
        }"#,
    );

    prdloop(&dir)
        .args(["close-phase", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("US-002"));

    let content = std::fs::read_to_string(dir.path().join(".prdloop/prd.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(v["stories"][0]["status"], "complete");
    assert_eq!(v["stories"][1]["status"], "skipped");
}

#[test]
fn clear_stale_resets_old_in_progress() {
    let dir = TempDir::new().unwrap();
    write_backlog(
        &dir,
        r#"{
          "project": {"name": "demo", "description": "d"},
          "stories": [
            {"id": "US-001", "title": "stale", "status": "in_progress", "startedAt": "2020-01-01T00:00:00Z"}
          ]
        }"#,
    );

    prdloop(&dir)
        .args(["clear-stale", "--max-age-hours", "24"])
        .assert()
        .success()
        .stdout(predicate::str::contains("US-001"));

    let content = std::fs::read_to_string(dir.path().join(".prdloop/prd.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(v["stories"][0]["status"], "incomplete");
}

#[test]
fn clear_stale_keeps_recent_in_progress() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);
    prdloop(&dir).args(["start", "US-001"]).assert().success();

    prdloop(&dir)
        .args(["clear-stale", "--max-age-hours", "24"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no stale"));

    let content = std::fs::read_to_string(dir.path().join(".prdloop/prd.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(v["stories"][0]["status"], "in_progress");
}

// ---------------------------------------------------------------------------
// prdloop run
// ---------------------------------------------------------------------------

#[test]
fn run_requires_init() {
    let dir = TempDir::new().unwrap();

    prdloop(&dir)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn run_refuses_invalid_backlog() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_backlog(&dir, r#"{"project": {"name": "demo", "description": "d"}}"#);

    prdloop(&dir)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("backlog invalid"));
}

#[cfg(unix)]
#[test]
fn run_completes_backlog_with_stub_agent() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);
    write_agent_config(&dir, "#!/bin/sh\necho implemented\nexit 0\n");

    let out = prdloop(&dir)
        .args(["--json", "run"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["stopReason"], "backlog_exhausted");
    assert_eq!(v["iterations"], 2);
    assert_eq!(v["completedStories"], 2);

    let content = std::fs::read_to_string(dir.path().join(".prdloop/prd.json")).unwrap();
    let b: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(b["stories"][0]["status"], "complete");
    assert_eq!(b["stories"][1]["status"], "complete");

    let progress = std::fs::read_to_string(dir.path().join(".prdloop/progress.md")).unwrap();
    assert!(progress.contains("## Iteration 1 - US-001"));
    assert!(progress.contains("PASSED"));
}

#[cfg(unix)]
#[test]
fn run_stops_at_failure_budget() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);
    write_agent_config(&dir, "#!/bin/sh\necho boom >&2\nexit 1\n");

    let out = prdloop(&dir)
        .args(["--json", "run"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["stopReason"], "failure_budget");
    assert_eq!(v["iterations"], 2);
    assert_eq!(v["completedStories"], 0);

    let progress = std::fs::read_to_string(dir.path().join(".prdloop/progress.md")).unwrap();
    assert!(progress.contains("FAILED"));
}

#[cfg(unix)]
#[test]
fn run_respects_max_iterations_override() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);
    write_agent_config(&dir, "#!/bin/sh\nexit 0\n");

    let out = prdloop(&dir)
        .args(["--json", "run", "--max-iterations", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["stopReason"], "max_iterations");
    assert_eq!(v["iterations"], 1);
    assert_eq!(v["completedStories"], 1);
}

#[cfg(unix)]
#[test]
fn run_failing_gate_fails_story() {
    let dir = TempDir::new().unwrap();
    write_backlog(&dir, CLEAN_BACKLOG);
    write_agent_config(&dir, "#!/bin/sh\nexit 0\n");

    // Replace the empty gate list with one that always fails.
    let config_path = dir.path().join(".prdloop/config.json");
    let mut config: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config_path).unwrap()).unwrap();
    config["gates"] = serde_json::json!([
        {"name": "check", "command": "false", "required": true, "timeoutSeconds": 5}
    ]);
    std::fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let out = prdloop(&dir)
        .args(["--json", "run"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["stopReason"], "failure_budget");
    assert_eq!(v["completedStories"], 0);

    let progress = std::fs::read_to_string(dir.path().join(".prdloop/progress.md")).unwrap();
    assert!(progress.contains("Gate 'check' failed"));
}

#[cfg(unix)]
#[test]
fn run_phase_filter_only_touches_that_phase() {
    let dir = TempDir::new().unwrap();
    write_backlog(
        &dir,
        r#"{
          "project": {"name": "demo", "description": "d"},
          "phases": [{"number": 1, "name": "One"}, {"number": 2, "name": "Two"}],
          "stories": [
            {"id": "US-001", "title": "a", "phase": 1, "acceptanceCriteria": ["typecheck"]},
            {"id": "US-002", "title": "b", "phase": 2, "acceptanceCriteria": ["typecheck"]}
          ]
        }"#,
    );
    write_agent_config(&dir, "#!/bin/sh\nexit 0\n");

    prdloop(&dir)
        .args(["run", "--phase", "1"])
        .assert()
        .success();

    let content = std::fs::read_to_string(dir.path().join(".prdloop/prd.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(v["stories"][0]["status"], "complete");
    assert_eq!(v["stories"][1]["status"], "incomplete");
}
