use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_SCENARIO_CONFIG_PATH: &str = "config/scenario_transitions.yaml";
pub const START_STATE: &str = "START";

#[derive(Debug, Error)]
pub enum ScenarioConfigError {
    #[error("scenario config not found: `{0}`")]
    NotFound(PathBuf),
    #[error("could not read scenario config `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse scenario config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid scenario config: {0}")]
    Invalid(String),
    #[error("state `{0}` not found in configuration")]
    UnknownState(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetricConfig {
    pub name: String,
    pub labels: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateScope {
    All,
    Only(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuardConfig {
    pub name: String,
    pub prompt: String,
    pub apply_to_states: StateScope,
}

impl GuardConfig {
    pub fn applies_to(&self, state: &str) -> bool {
        match &self.apply_to_states {
            StateScope::All => true,
            StateScope::Only(states) => states.iter().any(|candidate| candidate == state),
        }
    }
}

/// Cross-cutting declarations. Carried as metadata; the engine does not
/// enforce guards or emit metrics from them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GlobalConfig {
    pub guards: Vec<GuardConfig>,
    pub metrics: Vec<MetricConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntryStep {
    pub action: String,
    pub params: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Transition {
    pub trigger: String,
    pub target: String,
    /// Reserved for guard evaluation; resolution does not read it yet.
    pub conditions: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StateConfig {
    pub name: String,
    pub description: String,
    pub entry_steps: Vec<EntryStep>,
    pub transitions: Vec<Transition>,
    /// Unrecognized fields of the state body, kept verbatim.
    pub raw: Map<String, Value>,
}

impl StateConfig {
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn suppress_fallback(&self) -> bool {
        self.extra("suppress_fallback").and_then(Value::as_bool).unwrap_or(false)
    }

    /// First transition declared for `trigger`. Exact string match only.
    pub fn transition_for(&self, trigger: &str) -> Option<&Transition> {
        self.transitions.iter().find(|transition| transition.trigger == trigger)
    }
}

/// Validated transition graph. States keep their document order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScenarioConfig {
    pub version: i64,
    pub metadata: Map<String, Value>,
    pub global: GlobalConfig,
    states: Vec<StateConfig>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ScenarioConfig {
    pub fn new(
        version: i64,
        metadata: Map<String, Value>,
        global: GlobalConfig,
        states: Vec<StateConfig>,
    ) -> Result<Self, ScenarioConfigError> {
        if states.is_empty() {
            return Err(ScenarioConfigError::Invalid(
                "scenario config must define at least one state".to_string(),
            ));
        }

        let index = states
            .iter()
            .enumerate()
            .map(|(position, state)| (state.name.clone(), position))
            .collect::<HashMap<_, _>>();

        Ok(Self { version, metadata, global, states, index })
    }

    pub fn state(&self, name: &str) -> Result<&StateConfig, ScenarioConfigError> {
        self.index
            .get(name)
            .map(|position| &self.states[*position])
            .ok_or_else(|| ScenarioConfigError::UnknownState(name.to_string()))
    }

    pub fn contains_state(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn states(&self) -> &[StateConfig] {
        &self.states
    }

    pub fn state_names(&self) -> Vec<&str> {
        self.states.iter().map(|state| state.name.as_str()).collect()
    }

    /// Entry state: `metadata.default_state`, else `START`, else the first
    /// declared state.
    pub fn default_state(&self) -> &str {
        if let Some(configured) = self.metadata.get("default_state").and_then(non_empty_label) {
            return configured;
        }
        if self.contains_state(START_STATE) {
            return START_STATE;
        }
        &self.states[0].name
    }

    /// `(state, target)` pairs whose target is not declared. Such transitions
    /// load fine and only fail when taken.
    pub fn dangling_targets(&self) -> Vec<(&str, &str)> {
        self.states
            .iter()
            .flat_map(|state| {
                state
                    .transitions
                    .iter()
                    .filter(|transition| !self.contains_state(&transition.target))
                    .map(move |transition| (state.name.as_str(), transition.target.as_str()))
            })
            .collect()
    }
}

fn non_empty_label(value: &Value) -> Option<&str> {
    value.as_str().filter(|label| !label.trim().is_empty())
}
