use std::path::PathBuf;
use std::time::Duration;

use scenebot_agent::manager::{EngineDependencies, SceneManager};
use scenebot_core::config::{AppConfig, LoadOptions};
use scenebot_core::domain::response::SceneResponse;
use scenebot_core::domain::user::{FunnelStage, Segment, User};
use scenebot_core::scenario::{command_trigger, resolve_callback_trigger};
use serde::Serialize;

use crate::commands::{current_thread_runtime, CommandResult};

const TEXT_PREFIX: &str = "text:";

#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub user_id: i64,
    pub segment: Option<String>,
    pub score: i32,
    pub stage: Option<String>,
    pub path: Option<PathBuf>,
    pub inputs: Vec<String>,
}

/// How one raw input reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedInput {
    Trigger(String),
    Message(String),
}

impl SimulatedInput {
    /// `/cmd` is a command, `text:...` is free text, `command:`/`callback:`
    /// pass through, anything else is treated as a button payload.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(text) = raw.strip_prefix(TEXT_PREFIX) {
            return Self::Message(text.trim().to_string());
        }
        if raw.starts_with('/') {
            return Self::Trigger(command_trigger(raw));
        }
        if raw.starts_with("command:") {
            return Self::Trigger(raw.to_string());
        }
        Self::Trigger(resolve_callback_trigger(raw).unwrap_or_else(|| raw.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct SimulatedTurn<'a> {
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    trigger: Option<&'a str>,
    state: Option<String>,
    scene: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    response: SceneResponse,
}

pub fn run(args: SimulateArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let user = match build_user(&args) {
        Ok(user) => user,
        Err(message) => return CommandResult::failure("simulate", "invalid_user", message, 2),
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let path = args.path.clone().unwrap_or_else(|| config.scenario.path.clone());
    let deps = match runtime.block_on(EngineDependencies::from_config(&config)) {
        Ok(deps) => deps,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "session_store",
                format!("session store unavailable: {error:#}"),
                4,
            );
        }
    };
    let manager = SceneManager::new(path, deps)
        .with_session_ttl(Duration::from_secs(config.session.ttl_secs));
    let graph_enabled = manager.config_enabled();

    let lines = runtime.block_on(async {
        let mut lines = Vec::with_capacity(args.inputs.len());
        for raw in &args.inputs {
            let input = SimulatedInput::parse(raw);
            let (trigger, response, error) = match &input {
                SimulatedInput::Trigger(trigger) => {
                    match manager.process_trigger(&user, trigger, None, None).await {
                        Ok(response) => (Some(trigger.as_str()), response, None),
                        Err(err) => {
                            (Some(trigger.as_str()), err.fallback_response(), Some(err.to_string()))
                        }
                    }
                }
                SimulatedInput::Message(text) => {
                    (None, manager.process_user_message(&user, text).await, None)
                }
            };
            let session = manager.session_for(&user).await;
            let turn = SimulatedTurn {
                input: raw,
                trigger,
                state: session.current_state,
                scene: session.current_scene.map(|scene| scene.to_string()),
                error,
                response,
            };
            lines.push(
                serde_json::to_string(&turn)
                    .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}")),
            );
        }
        lines
    });

    let mode = if graph_enabled { "scenario graph" } else { "rule-based scenes" };
    CommandResult::success("simulate", format!("simulated {} input(s) using {mode}", lines.len()))
        .with_leading_lines(lines)
}

fn build_user(args: &SimulateArgs) -> Result<User, String> {
    let mut user = User::new(args.user_id).with_lead_score(args.score);
    if let Some(segment) = &args.segment {
        user = user.with_segment(segment.parse::<Segment>()?);
    }
    if let Some(stage) = &args.stage {
        user = user.with_funnel_stage(stage.parse::<FunnelStage>()?);
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::SimulatedInput;

    #[test]
    fn raw_inputs_map_to_engine_calls() {
        assert_eq!(
            SimulatedInput::parse("/start"),
            SimulatedInput::Trigger("command:/start".to_string())
        );
        assert_eq!(
            SimulatedInput::parse("retry"),
            SimulatedInput::Trigger("callback:survey:start".to_string())
        );
        assert_eq!(
            SimulatedInput::parse("text: hello there"),
            SimulatedInput::Message("hello there".to_string())
        );
        assert_eq!(
            SimulatedInput::parse("mystery:value"),
            SimulatedInput::Trigger("mystery:value".to_string())
        );
    }
}
