use std::path::{Path, PathBuf};

use scenebot_core::config::{AppConfig, LoadOptions};
use scenebot_core::scenario::{ScenarioConfig, ScenarioConfigError, StateScope};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct GraphSummary {
    path: String,
    version: i64,
    default_state: String,
    states: Vec<String>,
    entry_steps: usize,
    transitions: usize,
    guards: Vec<GuardSummary>,
    metrics: Vec<String>,
    dangling_targets: Vec<DanglingTarget>,
}

#[derive(Debug, Serialize)]
struct GuardSummary {
    name: String,
    scope: String,
}

#[derive(Debug, Serialize)]
struct DanglingTarget {
    state: String,
    target: String,
}

pub fn run(path: Option<&Path>) -> CommandResult {
    let path = match scenario_path(path) {
        Ok(path) => path,
        Err(result) => return result,
    };

    let scenario = match ScenarioConfig::load(&path) {
        Ok(scenario) => scenario,
        Err(ScenarioConfigError::NotFound(missing)) => {
            return CommandResult::failure(
                "validate",
                "scenario_missing",
                format!("scenario graph not found at `{}`", missing.display()),
                2,
            );
        }
        Err(error) => {
            return CommandResult::failure("validate", "scenario_invalid", error.to_string(), 2);
        }
    };

    let summary = summarize(&path, &scenario);
    let message = if summary.dangling_targets.is_empty() {
        format!("scenario graph v{} is valid ({} states)", summary.version, summary.states.len())
    } else {
        format!(
            "scenario graph v{} loaded with {} transition(s) to undeclared states",
            summary.version,
            summary.dangling_targets.len()
        )
    };

    CommandResult::success_with_details("validate", message, serde_json::to_value(summary).ok())
}

/// Explicit path, else the configured one.
pub(crate) fn scenario_path(explicit: Option<&Path>) -> Result<PathBuf, CommandResult> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    AppConfig::load(LoadOptions::default()).map(|config| config.scenario.path).map_err(|error| {
        CommandResult::failure(
            "validate",
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

fn summarize(path: &Path, scenario: &ScenarioConfig) -> GraphSummary {
    let states = scenario.states();
    GraphSummary {
        path: path.display().to_string(),
        version: scenario.version,
        default_state: scenario.default_state().to_string(),
        states: scenario.state_names().into_iter().map(str::to_string).collect(),
        entry_steps: states.iter().map(|state| state.entry_steps.len()).sum(),
        transitions: states.iter().map(|state| state.transitions.len()).sum(),
        guards: scenario
            .global
            .guards
            .iter()
            .map(|guard| GuardSummary {
                name: guard.name.clone(),
                scope: match &guard.apply_to_states {
                    StateScope::All => "*".to_string(),
                    StateScope::Only(states) => states.join(","),
                },
            })
            .collect(),
        metrics: scenario.global.metrics.iter().map(|metric| metric.name.clone()).collect(),
        dangling_targets: scenario
            .dangling_targets()
            .into_iter()
            .map(|(state, target)| DanglingTarget {
                state: state.to_string(),
                target: target.to_string(),
            })
            .collect(),
    }
}
