use std::env;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use scenebot_cli::commands::simulate::SimulateArgs;
use scenebot_cli::commands::{config, doctor, migrate, simulate, validate};
use serde_json::Value;

fn workspace_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").join(relative)
}

fn sample_graph() -> PathBuf {
    workspace_path("config/scenario_transitions.yaml")
}

#[test]
fn validate_summarizes_sample_graph() {
    with_env(&[], || {
        let result = validate::run(Some(&sample_graph()));
        assert_eq!(result.exit_code, 0, "sample graph should validate: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "validate");
        assert_eq!(payload["status"], "ok");
        let details = &payload["details"];
        assert_eq!(details["version"], 1);
        assert_eq!(details["default_state"], "START");
        assert!(details["states"]
            .as_array()
            .expect("state list")
            .iter()
            .any(|state| state == "WELCOME"));
        assert_eq!(details["dangling_targets"], Value::Array(Vec::new()));
        assert_eq!(details["guards"][0]["scope"], "*");
    });
}

#[test]
fn validate_reports_dangling_targets_without_failing() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph.yaml");
        std::fs::write(
            &path,
            "version: 3\nstates:\n  START:\n    transitions:\n      - trigger: \"command:/start\"\n        target: LOST\n",
        )
        .expect("write graph");

        let result = validate::run(Some(&path));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["details"]["dangling_targets"][0]["state"], "START");
        assert_eq!(payload["details"]["dangling_targets"][0]["target"], "LOST");
        assert!(payload["message"].as_str().unwrap_or_default().contains("undeclared"));
    });
}

#[test]
fn validate_fails_for_missing_and_invalid_graphs() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");

        let missing = validate::run(Some(&dir.path().join("absent.yaml")));
        assert_eq!(missing.exit_code, 2);
        assert_eq!(parse_payload(&missing.output)["error_class"], "scenario_missing");

        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "version: 1\nstates: []\n").expect("write graph");
        let invalid = validate::run(Some(&path));
        assert_eq!(invalid.exit_code, 2);
        assert_eq!(parse_payload(&invalid.output)["error_class"], "scenario_invalid");
    });
}

#[test]
fn simulate_walks_sample_graph_turn_by_turn() {
    let prompts = workspace_path("config/prompts");
    let prompts = prompts.to_string_lossy().to_string();
    with_env(&[("SCENEBOT_SCENARIO_PROMPTS_DIR", prompts.as_str())], || {
        let result = simulate::run(SimulateArgs {
            user_id: 42,
            segment: Some("warm".to_string()),
            score: 7,
            stage: Some("welcomed".to_string()),
            path: Some(sample_graph()),
            inputs: vec!["/start".to_string(), "survey:start".to_string()],
        });
        assert_eq!(result.exit_code, 0, "simulation should succeed: {}", result.output);

        let lines = result.output.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3, "two turns plus the summary line");

        let welcome = parse_payload(lines[0]);
        assert_eq!(welcome["trigger"], "command:/start");
        assert_eq!(welcome["state"], "WELCOME");
        assert!(!welcome["response"]["buttons"].as_array().expect("buttons").is_empty());
        assert_eq!(welcome["response"]["log_event"]["event"], "welcome_shown");

        let survey = parse_payload(lines[1]);
        assert_eq!(survey["trigger"], "callback:survey:start");
        assert_eq!(survey["state"], "SURVEY");
        assert_eq!(
            survey["response"]["message_text"],
            "Step SURVEY: this feature is under construction."
        );

        let summary = parse_payload(lines[2]);
        assert_eq!(summary["command"], "simulate");
        assert_eq!(summary["status"], "ok");
    });
}

#[test]
fn simulate_sends_free_text_to_rule_based_scenes() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = simulate::run(SimulateArgs {
            user_id: 7,
            segment: Some("hot".to_string()),
            score: 12,
            stage: None,
            path: Some(dir.path().join("absent.yaml")),
            inputs: vec!["text:what can you offer?".to_string(), "/start".to_string()],
        });
        assert_eq!(result.exit_code, 0);

        let lines = result.output.lines().collect::<Vec<_>>();
        let free_text = parse_payload(lines[0]);
        assert_eq!(free_text["scene"], "investor");
        assert!(free_text.get("trigger").is_none());

        let command = parse_payload(lines[1]);
        assert!(command["response"]["message_text"]
            .as_str()
            .unwrap_or_default()
            .contains("Not ready to answer yet"));

        let summary = parse_payload(lines[2]);
        assert!(summary["message"].as_str().unwrap_or_default().contains("rule-based scenes"));
    });
}

#[test]
fn simulate_resumes_sessions_from_sqlite_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("sessions.db").display());
    let prompts = workspace_path("config/prompts").to_string_lossy().to_string();
    let run_once = |input: &str| {
        simulate::run(SimulateArgs {
            user_id: 77,
            segment: Some("warm".to_string()),
            score: 5,
            stage: None,
            path: Some(sample_graph()),
            inputs: vec![input.to_string()],
        })
    };

    with_env(
        &[
            ("SCENEBOT_SESSION_STORE", "sqlite"),
            ("SCENEBOT_DATABASE_URL", url.as_str()),
            ("SCENEBOT_SCENARIO_PROMPTS_DIR", prompts.as_str()),
        ],
        || {
            let first = run_once("/start");
            assert_eq!(first.exit_code, 0, "first run: {}", first.output);
            let welcome = parse_payload(first.output.lines().next().expect("turn line"));
            assert_eq!(welcome["state"], "WELCOME");

            let second = run_once("survey:start");
            assert_eq!(second.exit_code, 0, "second run: {}", second.output);
            let survey = parse_payload(second.output.lines().next().expect("turn line"));
            assert_eq!(survey["state"], "SURVEY", "second run should resume from WELCOME");
        },
    );

    with_env(&[("SCENEBOT_SCENARIO_PROMPTS_DIR", prompts.as_str())], || {
        let fresh = run_once("survey:start");
        let turn = parse_payload(fresh.output.lines().next().expect("turn line"));
        assert_eq!(turn["state"], "START", "the memory store starts every run from scratch");
    });
}

#[test]
fn simulate_reports_unreachable_sqlite_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("missing/sessions.db").display());
    with_env(&[("SCENEBOT_SESSION_STORE", "sqlite"), ("SCENEBOT_DATABASE_URL", url.as_str())], || {
        let result = simulate::run(SimulateArgs {
            user_id: 1,
            segment: None,
            score: 0,
            stage: None,
            path: Some(sample_graph()),
            inputs: vec!["/start".to_string()],
        });
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "session_store");
    });
}

#[test]
fn simulate_rejects_unknown_segment() {
    with_env(&[], || {
        let result = simulate::run(SimulateArgs {
            user_id: 1,
            segment: Some("lukewarm".to_string()),
            score: 0,
            stage: None,
            path: Some(sample_graph()),
            inputs: vec!["/start".to_string()],
        });
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_user");
    });
}

#[test]
fn migrate_returns_success_with_memory_database() {
    with_env(&[("SCENEBOT_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_settings() {
    with_env(&[("SCENEBOT_DATABASE_URL", "postgres://nope")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_with_sample_graph_and_memory_database() {
    let graph = sample_graph().to_string_lossy().to_string();
    let prompts = workspace_path("config/prompts").to_string_lossy().to_string();
    with_env(
        &[
            ("SCENEBOT_DATABASE_URL", "sqlite::memory:"),
            ("SCENEBOT_SCENARIO_PATH", graph.as_str()),
            ("SCENEBOT_SCENARIO_PROMPTS_DIR", prompts.as_str()),
        ],
        || {
            let report = parse_payload(&doctor::run(true));
            assert_eq!(report["overall_status"], "pass", "report: {report}");
            let names = report["checks"]
                .as_array()
                .expect("checks")
                .iter()
                .map(|check| check["name"].as_str().unwrap_or_default().to_string())
                .collect::<Vec<_>>();
            assert_eq!(
                names,
                vec!["config_validation", "scenario_graph", "prompt_fragments", "database_connectivity"]
            );
        },
    );
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("SCENEBOT_SESSION_TTL_SECS", "0")], || {
        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][0]["status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");

        let human = doctor::run(false);
        assert!(human.starts_with("doctor: one or more readiness checks failed"));
        assert!(human.contains("- [fail] config_validation"));
    });
}

#[test]
fn config_attributes_values_to_their_source() {
    with_env(&[("SCENEBOT_SESSION_TTL_SECS", "900")], || {
        let output = config::run();
        assert!(output.starts_with("effective config"));
        assert!(output
            .contains("- session.ttl_secs = 900 (source: env (SCENEBOT_SESSION_TTL_SECS))"));
        assert!(output.contains("- session.store = memory (source: default)"));
        assert!(output.contains("- logging.format = compact (source: default)"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SCENEBOT_DATABASE_URL",
        "SCENEBOT_DATABASE_MAX_CONNECTIONS",
        "SCENEBOT_DATABASE_TIMEOUT_SECS",
        "SCENEBOT_SCENARIO_PATH",
        "SCENEBOT_SCENARIO_PROMPTS_DIR",
        "SCENEBOT_SESSION_TTL_SECS",
        "SCENEBOT_SESSION_STORE",
        "SCENEBOT_LOGGING_LEVEL",
        "SCENEBOT_LOGGING_FORMAT",
        "SCENEBOT_LOG_LEVEL",
        "SCENEBOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
