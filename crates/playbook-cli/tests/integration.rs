#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const AS_OF: &str = "2026-06-01T00:00:00Z";

fn playbook(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("playbook").unwrap();
    cmd.current_dir(dir.path()).env("PLAYBOOK_ROOT", dir.path());
    cmd
}

fn init_workspace(dir: &TempDir) {
    playbook(dir).arg("init").assert().success();
}

/// Two playbooks, three runs in May and one in March.
fn write_snapshot(dir: &TempDir) {
    let body = r#"{
      "playbooks": [
        {"id": "pb-founders", "name": "Founders", "segment": "startup", "goal": "meetings",
         "channel_mix": {"email": 70, "linkedin": 30}, "schedule_frequency": "weekly",
         "status": "active"},
        {"id": "pb-cio", "name": "CIO outreach", "segment": "enterprise", "goal": "meetings",
         "channel_mix": {"email": 100}, "schedule_frequency": "monthly", "status": "paused"}
      ],
      "runs": [
        {"id": "run-1", "playbook_id": "pb-founders", "status": "completed",
         "started_at": "2026-05-20T09:00:00Z", "completed_at": "2026-05-20T11:00:00Z",
         "leads_targeted": 120, "emails_sent": 100, "responses": 25, "meetings_booked": 6},
        {"id": "run-2", "playbook_id": "pb-cio", "status": "completed",
         "started_at": "2026-05-25T09:00:00Z", "completed_at": "2026-05-25T10:00:00Z",
         "leads_targeted": 80, "emails_sent": 80, "responses": 8, "meetings_booked": 2},
        {"id": "run-3", "playbook_id": "pb-founders", "status": "running",
         "started_at": "2026-05-30T09:00:00Z",
         "leads_targeted": 50, "emails_sent": 20, "responses": 2, "meetings_booked": 0},
        {"id": "run-4", "playbook_id": "pb-founders", "status": "completed",
         "started_at": "2026-03-01T09:00:00Z", "completed_at": "2026-03-01T12:00:00Z",
         "leads_targeted": 100, "emails_sent": 100, "responses": -3, "meetings_booked": 4}
      ]
    }"#;
    std::fs::create_dir_all(dir.path().join(".playbook")).unwrap();
    std::fs::write(dir.path().join(".playbook/snapshot.json"), body).unwrap();
}

fn json_of(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

// ---------------------------------------------------------------------------
// playbook init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_ignores_snapshot() {
    let dir = TempDir::new().unwrap();
    playbook(&dir)
        .args(["init", "--api-url", "http://api.internal:8000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));

    let config = std::fs::read_to_string(dir.path().join(".playbook/config.yaml")).unwrap();
    assert!(config.contains("http://api.internal:8000"));
    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.lines().any(|l| l == ".playbook/snapshot.json"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    playbook(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already present"));
    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert_eq!(gitignore.matches(".playbook/snapshot.json").count(), 1);
}

// ---------------------------------------------------------------------------
// playbook config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_requires_init() {
    let dir = TempDir::new().unwrap();
    playbook(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn default_config_is_valid() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    playbook(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    std::fs::write(
        dir.path().join(".playbook/config.yaml"),
        "api:\n  base_url: \"\"\n  timeout_seconds: 0\n",
    )
    .unwrap();
    playbook(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

#[test]
fn config_show_prints_defaults_without_init() {
    let dir = TempDir::new().unwrap();
    let cfg = json_of(playbook(&dir).args(["config", "show", "--json"]));
    assert_eq!(cfg["server"]["port"], 3142);
    assert_eq!(cfg["timeline"]["buckets"], 7);
}

// ---------------------------------------------------------------------------
// playbook fetch
// ---------------------------------------------------------------------------

#[test]
fn fetch_writes_snapshot() {
    let mut server = mockito::Server::new();
    let _playbooks = server
        .mock("GET", "/playbooks")
        .with_body(
            r#"[{"id":"pb-1","name":"Founders","segment":"startup","goal":"meetings",
                "channel_mix":{"email":100},"schedule_frequency":"weekly","status":"active"}]"#,
        )
        .create();
    let _runs = server
        .mock("GET", "/playbooks/pb-1/runs")
        .with_body(
            r#"[{"id":"run-1","status":"completed","started_at":"2026-05-20T09:00:00Z",
                "leads_targeted":10,"emails_sent":10,"responses":2,"meetings_booked":1}]"#,
        )
        .create();

    let dir = TempDir::new().unwrap();
    playbook(&dir)
        .args(["init", "--api-url", &server.url()])
        .assert()
        .success();
    playbook(&dir)
        .arg("fetch")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fetched 1 playbooks and 1 runs"));
    assert!(dir.path().join(".playbook/snapshot.json").exists());

    let summary = json_of(playbook(&dir).args(["summary", "--json"]));
    assert_eq!(summary["total_meetings"], 1);
}

#[test]
fn fetch_failure_is_reported() {
    let mut server = mockito::Server::new();
    let _m = server.mock("GET", "/playbooks").with_status(500).create();

    let dir = TempDir::new().unwrap();
    playbook(&dir)
        .args(["init", "--api-url", &server.url()])
        .assert()
        .success();
    playbook(&dir)
        .arg("fetch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("HTTP 500"));
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[test]
fn views_need_a_snapshot() {
    let dir = TempDir::new().unwrap();
    init_workspace(&dir);
    playbook(&dir)
        .arg("summary")
        .assert()
        .failure()
        .stderr(predicate::str::contains("playbook fetch"));
}

#[test]
fn summary_counts_all_runs() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    let summary = json_of(playbook(&dir).args(["summary", "--json"]));
    assert_eq!(summary["total_playbooks"], 2);
    assert_eq!(summary["active_playbooks"], 1);
    assert_eq!(summary["total_leads_targeted"], 350);
    assert_eq!(summary["total_meetings"], 12);
}

#[test]
fn funnel_covers_default_window() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    let funnel = json_of(playbook(&dir).args(["funnel", "--json", "--as-of", AS_OF]));
    let values: Vec<u64> = funnel["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["value"].as_u64().unwrap())
        .collect();
    assert_eq!(values, vec![250, 200, 35, 8]);

    playbook(&dir)
        .args(["funnel", "--as-of", AS_OF])
        .assert()
        .success()
        .stdout(predicate::str::contains("Overall conversion: 3.2%"));
}

#[test]
fn matrix_metric_selection() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    let matrix = json_of(playbook(&dir).args([
        "matrix", "--json", "--metric", "meetings", "--as-of", AS_OF,
    ]));
    assert_eq!(matrix["metric"], "meetings");
    assert_eq!(matrix["cells"].as_array().unwrap().len(), 9);

    playbook(&dir)
        .args(["matrix", "--metric", "ctr"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown metric: ctr"));
}

#[test]
fn health_prints_grid() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    playbook(&dir)
        .args(["health", "--as-of", AS_OF])
        .assert()
        .success()
        .stdout(predicate::str::contains("Average score"))
        .stdout(predicate::str::contains("no data"));
}

#[test]
fn timeline_filters_and_rejects_unknown_playbook() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    let timeline = json_of(playbook(&dir).args([
        "timeline", "--json", "--playbook", "pb-founders", "--as-of", AS_OF,
    ]));
    assert_eq!(timeline["entries"].as_array().unwrap().len(), 2);
    assert_eq!(timeline["summary"]["status_counts"]["running"], 1);

    playbook(&dir)
        .args(["timeline", "--playbook", "pb-ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("playbook not found"));
}

#[test]
fn timeline_accepts_orphan_playbook_id() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".playbook")).unwrap();
    std::fs::write(
        dir.path().join(".playbook/snapshot.json"),
        r#"{"playbooks": [], "runs": [
          {"id": "run-orphan", "playbook_id": "pb-gone", "status": "completed",
           "started_at": "2026-05-28T09:00:00Z", "completed_at": "2026-05-28T10:00:00Z",
           "leads_targeted": 10, "emails_sent": 10, "responses": 1, "meetings_booked": 1}
        ]}"#,
    )
    .unwrap();
    let timeline = json_of(playbook(&dir).args([
        "timeline", "--json", "--playbook", "pb-gone", "--as-of", AS_OF,
    ]));
    assert_eq!(timeline["summary"]["total_runs"], 1);
    assert_eq!(timeline["entries"][0]["run_id"], "run-orphan");
}

#[test]
fn explicit_range_narrows_timeline() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    let timeline = json_of(playbook(&dir).args([
        "timeline",
        "--json",
        "--start",
        "2026-02-15T00:00:00Z",
        "--end",
        "2026-03-15T00:00:00Z",
    ]));
    let entries = timeline["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["run_id"], "run-4");

    playbook(&dir)
        .args([
            "timeline",
            "--start",
            "2026-03-15T00:00:00Z",
            "--end",
            "2026-02-15T00:00:00Z",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid time range"));
}

#[test]
fn insights_honor_limit() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    let insights = json_of(playbook(&dir).args([
        "insights", "--json", "--limit", "2", "--as-of", AS_OF,
    ]));
    assert!(insights.as_array().unwrap().len() <= 2);
}

#[test]
fn report_prints_every_section() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    playbook(&dir)
        .args(["report", "--as-of", AS_OF])
        .assert()
        .success()
        .stdout(predicate::str::contains("Funnel"))
        .stdout(predicate::str::contains("Insights"))
        .stdout(predicate::str::contains("Data quality"));
}

#[test]
fn quality_lists_repaired_counters() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    playbook(&dir)
        .arg("quality")
        .assert()
        .success()
        .stdout(predicate::str::contains("run-4"))
        .stdout(predicate::str::contains("responses"));
}

// ---------------------------------------------------------------------------
// playbook run
// ---------------------------------------------------------------------------

#[test]
fn run_show_prints_rates_and_score() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    playbook(&dir)
        .args(["run", "show", "run-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Founders (pb-founders)"))
        .stdout(predicate::str::contains("response 25.0%"))
        .stdout(predicate::str::contains("Score:"));

    playbook(&dir)
        .args(["run", "show", "run-99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("run not found"));
}

#[test]
fn run_list_is_newest_first() {
    let dir = TempDir::new().unwrap();
    write_snapshot(&dir);
    let runs = json_of(playbook(&dir).args(["run", "list", "--playbook", "pb-founders", "--json"]));
    let ids: Vec<&str> = runs
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["run-3", "run-1", "run-4"]);
}

#[test]
fn run_transition_checks() {
    let dir = TempDir::new().unwrap();
    playbook(&dir)
        .args(["run", "transition", "running", "paused"])
        .assert()
        .success()
        .stdout(predicate::str::contains("allowed"));
    playbook(&dir)
        .args(["run", "transition", "completed", "running"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid run transition"));
}
