use std::fs;
use std::io;
use std::path::Path;

use serde_json::{Map, Number, Value};
use serde_yaml::{Mapping, Value as Yaml};

use crate::scenario::model::{
    EntryStep, GlobalConfig, GuardConfig, MetricConfig, ScenarioConfig, ScenarioConfigError,
    StateConfig, StateScope, Transition,
};

const STATE_KEYS: [&str; 3] = ["description", "entry", "transitions"];

impl ScenarioConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ScenarioConfigError::NotFound(path.to_path_buf()),
            _ => ScenarioConfigError::Read { path: path.to_path_buf(), source },
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(input: &str) -> Result<Self, ScenarioConfigError> {
        let document: Yaml = serde_yaml::from_str(input)?;
        parse_document(document)
    }
}

fn invalid(message: impl Into<String>) -> ScenarioConfigError {
    ScenarioConfigError::Invalid(message.into())
}

fn parse_document(document: Yaml) -> Result<ScenarioConfig, ScenarioConfigError> {
    let root = match document {
        Yaml::Mapping(root) => root,
        Yaml::Null => Mapping::new(),
        _ => return Err(invalid("scenario config root must be a mapping")),
    };

    let version = match root.get("version") {
        None | Some(Yaml::Null) => return Err(invalid("scenario config missing `version`")),
        Some(Yaml::Number(number)) if number.is_i64() || number.is_u64() => {
            number.as_i64().ok_or_else(|| invalid("scenario config `version` is out of range"))?
        }
        Some(_) => return Err(invalid("scenario config `version` must be an integer")),
    };

    let metadata = match root.get("metadata") {
        None | Some(Yaml::Null) => Map::new(),
        Some(Yaml::Mapping(metadata)) => mapping_to_json(metadata),
        Some(_) => return Err(invalid("scenario config `metadata` must be a mapping")),
    };

    let global = match root.get("global") {
        None | Some(Yaml::Null) => GlobalConfig::default(),
        Some(Yaml::Mapping(global)) => GlobalConfig {
            guards: parse_guards(global.get("guards"))?,
            metrics: parse_metrics(global.get("metrics"))?,
        },
        Some(_) => return Err(invalid("scenario config `global` must be a mapping")),
    };

    let states = match root.get("states") {
        None | Some(Yaml::Null) => return Err(invalid("scenario config missing `states`")),
        Some(Yaml::Mapping(states)) => parse_states(states)?,
        Some(_) => return Err(invalid("expected mapping for `states`")),
    };

    ScenarioConfig::new(version, metadata, global, states)
}

fn sequence<'a>(
    node: Option<&'a Yaml>,
    path: &str,
) -> Result<&'a [Yaml], ScenarioConfigError> {
    match node {
        None | Some(Yaml::Null) => Ok(&[]),
        Some(Yaml::Sequence(items)) => Ok(items),
        Some(_) => Err(invalid(format!("{path} must be a list"))),
    }
}

fn required_string(item: &Mapping, key: &str) -> Option<String> {
    item.get(key).and_then(Yaml::as_str).filter(|value| !value.is_empty()).map(str::to_string)
}

fn parse_guards(node: Option<&Yaml>) -> Result<Vec<GuardConfig>, ScenarioConfigError> {
    let mut guards = Vec::new();
    for (idx, item) in sequence(node, "global.guards")?.iter().enumerate() {
        let position = idx + 1;
        let Yaml::Mapping(item) = item else {
            return Err(invalid(format!("global.guards[{position}] must be a mapping")));
        };
        let name = required_string(item, "name")
            .ok_or_else(|| invalid(format!("global.guards[{position}] missing string `name`")))?;
        let prompt = required_string(item, "prompt").ok_or_else(|| {
            invalid(format!("global.guards[{position}] missing string `prompt`"))
        })?;
        let apply_to_states = parse_scope(item.get("apply_to_states"), position)?;
        guards.push(GuardConfig { name, prompt, apply_to_states });
    }
    Ok(guards)
}

fn parse_scope(node: Option<&Yaml>, position: usize) -> Result<StateScope, ScenarioConfigError> {
    match node {
        None | Some(Yaml::Null) => Ok(StateScope::All),
        Some(Yaml::String(value)) if value == "*" => Ok(StateScope::All),
        Some(Yaml::String(value)) => Ok(StateScope::Only(vec![value.clone()])),
        Some(Yaml::Sequence(values)) => values
            .iter()
            .map(|value| value.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(StateScope::Only)
            .ok_or_else(|| scope_error(position)),
        Some(_) => Err(scope_error(position)),
    }
}

fn scope_error(position: usize) -> ScenarioConfigError {
    invalid(format!(
        "global.guards[{position}] apply_to_states must be '*', a string or a list of strings"
    ))
}

fn parse_metrics(node: Option<&Yaml>) -> Result<Vec<MetricConfig>, ScenarioConfigError> {
    let mut metrics = Vec::new();
    for (idx, item) in sequence(node, "global.metrics")?.iter().enumerate() {
        let position = idx + 1;
        let Yaml::Mapping(item) = item else {
            return Err(invalid(format!("global.metrics[{position}] must be a mapping")));
        };
        let name = required_string(item, "name")
            .ok_or_else(|| invalid(format!("global.metrics[{position}] missing string `name`")))?;
        let labels = match item.get("labels") {
            None | Some(Yaml::Null) => Vec::new(),
            Some(Yaml::Sequence(labels)) => labels
                .iter()
                .map(|label| label.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    invalid(format!("global.metrics[{position}] labels must be a list of strings"))
                })?,
            Some(_) => {
                return Err(invalid(format!(
                    "global.metrics[{position}] labels must be a list of strings"
                )))
            }
        };
        metrics.push(MetricConfig { name, labels });
    }
    Ok(metrics)
}

fn parse_states(raw_states: &Mapping) -> Result<Vec<StateConfig>, ScenarioConfigError> {
    let mut states = Vec::with_capacity(raw_states.len());
    for (key, body) in raw_states {
        let name = key
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid("state names must be strings"))?;
        let Yaml::Mapping(body) = body else {
            return Err(invalid(format!("state `{name}` must be defined as a mapping")));
        };

        let description = match body.get("description") {
            None | Some(Yaml::Null) => String::new(),
            Some(Yaml::String(description)) => description.clone(),
            Some(_) => return Err(invalid(format!("state `{name}`: description must be a string"))),
        };

        let steps = match body.get("entry") {
            Some(Yaml::Mapping(entry)) => entry.get("steps"),
            _ => None,
        };
        let entry_steps = parse_entry_steps(steps, &name)?;
        let transitions = parse_transitions(body.get("transitions"), &name)?;

        let raw = body
            .iter()
            .filter(|(key, _)| !key.as_str().is_some_and(|key| STATE_KEYS.contains(&key)))
            .map(|(key, value)| (yaml_key(key), yaml_to_json(value)))
            .collect::<Map<_, _>>();

        states.push(StateConfig { name, description, entry_steps, transitions, raw });
    }
    Ok(states)
}

fn parse_entry_steps(
    node: Option<&Yaml>,
    state: &str,
) -> Result<Vec<EntryStep>, ScenarioConfigError> {
    let mut steps = Vec::new();
    let path = format!("state `{state}`: entry.steps");
    for (idx, item) in sequence(node, &path)?.iter().enumerate() {
        let position = idx + 1;
        let Yaml::Mapping(item) = item else {
            return Err(invalid(format!("state `{state}`: step #{position} must be a mapping")));
        };
        let action = required_string(item, "action").ok_or_else(|| {
            invalid(format!("state `{state}`: step #{position} must define string `action`"))
        })?;
        let params = item
            .iter()
            .filter(|(key, _)| key.as_str() != Some("action"))
            .map(|(key, value)| (yaml_key(key), yaml_to_json(value)))
            .collect::<Map<_, _>>();
        steps.push(EntryStep { action, params });
    }
    Ok(steps)
}

fn parse_transitions(
    node: Option<&Yaml>,
    state: &str,
) -> Result<Vec<Transition>, ScenarioConfigError> {
    let mut transitions = Vec::new();
    let path = format!("state `{state}`: transitions");
    for (idx, item) in sequence(node, &path)?.iter().enumerate() {
        let position = idx + 1;
        let Yaml::Mapping(item) = item else {
            return Err(invalid(format!(
                "state `{state}`: transition #{position} must be a mapping"
            )));
        };
        let trigger = required_string(item, "trigger").ok_or_else(|| {
            invalid(format!("state `{state}`: transition #{position} missing string `trigger`"))
        })?;
        let target = required_string(item, "target").ok_or_else(|| {
            invalid(format!("state `{state}`: transition #{position} missing string `target`"))
        })?;
        let conditions = match item.get("conditions") {
            None | Some(Yaml::Null) => Map::new(),
            Some(Yaml::Mapping(conditions)) => mapping_to_json(conditions),
            Some(_) => {
                return Err(invalid(format!(
                    "state `{state}`: transition #{position} conditions must be a mapping"
                )))
            }
        };
        transitions.push(Transition { trigger, target, conditions });
    }
    Ok(transitions)
}

fn yaml_key(key: &Yaml) -> String {
    match key {
        Yaml::String(key) => key.clone(),
        Yaml::Bool(key) => key.to_string(),
        Yaml::Number(key) => key.to_string(),
        Yaml::Null => "null".to_string(),
        other => serde_yaml::to_string(other).map(|key| key.trim().to_string()).unwrap_or_default(),
    }
}

fn mapping_to_json(mapping: &Mapping) -> Map<String, Value> {
    mapping.iter().map(|(key, value)| (yaml_key(key), yaml_to_json(value))).collect()
}

fn yaml_to_json(value: &Yaml) -> Value {
    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(flag) => Value::Bool(*flag),
        Yaml::Number(number) => {
            if let Some(integer) = number.as_i64() {
                Value::from(integer)
            } else if let Some(unsigned) = number.as_u64() {
                Value::from(unsigned)
            } else {
                number.as_f64().and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null)
            }
        }
        Yaml::String(text) => Value::String(text.clone()),
        Yaml::Sequence(items) => Value::Array(items.iter().map(yaml_to_json).collect()),
        Yaml::Mapping(mapping) => Value::Object(mapping_to_json(mapping)),
        Yaml::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}
