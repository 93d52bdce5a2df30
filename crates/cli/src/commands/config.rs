use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use scenebot_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct Field<'a> {
    key: &'a str,
    env_keys: &'a [&'a str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = [
        Field {
            key: "database.url",
            env_keys: &["SCENEBOT_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env_keys: &["SCENEBOT_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env_keys: &["SCENEBOT_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "scenario.path",
            env_keys: &["SCENEBOT_SCENARIO_PATH"],
            value: config.scenario.path.display().to_string(),
        },
        Field {
            key: "scenario.prompts_dir",
            env_keys: &["SCENEBOT_SCENARIO_PROMPTS_DIR"],
            value: config.scenario.prompts_dir.display().to_string(),
        },
        Field {
            key: "session.ttl_secs",
            env_keys: &["SCENEBOT_SESSION_TTL_SECS"],
            value: config.session.ttl_secs.to_string(),
        },
        Field {
            key: "session.store",
            env_keys: &["SCENEBOT_SESSION_STORE"],
            value: config.session.store.as_str().to_string(),
        },
        Field {
            key: "logging.level",
            env_keys: &["SCENEBOT_LOGGING_LEVEL", "SCENEBOT_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["SCENEBOT_LOGGING_FORMAT", "SCENEBOT_LOG_FORMAT"],
            value: config.logging.format.as_str().to_string(),
        },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in &fields {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("config file"));
            return format!("file ({})", file_path.display());
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
