use scenebot_core::config::{AppConfig, LoadOptions};
use scenebot_core::scenario::{ScenarioConfig, ScenarioConfigError};
use scenebot_db::connect_with_config;
use serde::Serialize;

use crate::commands::current_thread_runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_scenario_graph(&config));
            checks.push(check_prompts_dir(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["scenario_graph", "prompt_fragments", "database_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks
        .iter()
        .any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// A missing graph only degrades the bot to rule-based scenes.
fn check_scenario_graph(config: &AppConfig) -> DoctorCheck {
    let path = &config.scenario.path;
    match ScenarioConfig::load(path) {
        Ok(scenario) => {
            let dangling = scenario.dangling_targets();
            if dangling.is_empty() {
                DoctorCheck {
                    name: "scenario_graph",
                    status: CheckStatus::Pass,
                    details: format!(
                        "`{}` v{} with {} states",
                        path.display(),
                        scenario.version,
                        scenario.states().len()
                    ),
                }
            } else {
                let targets = dangling
                    .iter()
                    .map(|(state, target)| format!("{state}->{target}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                DoctorCheck {
                    name: "scenario_graph",
                    status: CheckStatus::Warn,
                    details: format!("transitions to undeclared states: {targets}"),
                }
            }
        }
        Err(ScenarioConfigError::NotFound(missing)) => DoctorCheck {
            name: "scenario_graph",
            status: CheckStatus::Warn,
            details: format!(
                "`{}` not found; only rule-based scenes will answer",
                missing.display()
            ),
        },
        Err(error) => DoctorCheck {
            name: "scenario_graph",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_prompts_dir(config: &AppConfig) -> DoctorCheck {
    let dir = &config.scenario.prompts_dir;
    if dir.is_dir() {
        DoctorCheck {
            name: "prompt_fragments",
            status: CheckStatus::Pass,
            details: format!("prompt fragments read from `{}`", dir.display()),
        }
    } else {
        DoctorCheck {
            name: "prompt_fragments",
            status: CheckStatus::Warn,
            details: format!("`{}` missing; LLM steps run without scenario prompts", dir.display()),
        }
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!(
                "connected using `{}` (session store: {})",
                config.database.url,
                config.session.store.as_str()
            ),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
