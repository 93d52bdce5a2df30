use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::scene::SceneKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonTarget {
    CallbackData(String),
    Url(String),
}

/// Inline button rendered under a reply. Serializes to
/// `{"text": .., "callback_data": ..}` or `{"text": .., "url": ..}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    #[serde(flatten)]
    pub target: ButtonTarget,
}

impl Button {
    pub fn callback(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self { text: text.into(), target: ButtonTarget::CallbackData(callback_data.into()) }
    }

    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self { text: text.into(), target: ButtonTarget::Url(url.into()) }
    }

    pub fn callback_data(&self) -> Option<&str> {
        match &self.target {
            ButtonTarget::CallbackData(value) => Some(value),
            ButtonTarget::Url(_) => None,
        }
    }

    pub fn link(&self) -> Option<&str> {
        match &self.target {
            ButtonTarget::Url(value) => Some(value),
            ButtonTarget::CallbackData(_) => None,
        }
    }
}

/// Analytics record attached to a response. Config-driven entries fill
/// `state` and `trigger`; legacy scenes fill `scene` and `action`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<SceneKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl LogEvent {
    pub fn state_entered(
        event: impl Into<String>,
        state: impl Into<String>,
        trigger: impl Into<String>,
    ) -> Self {
        Self {
            event: event.into(),
            state: Some(state.into()),
            trigger: Some(trigger.into()),
            ..Self::default()
        }
    }

    pub fn scene_action(scene: SceneKind, action: impl Into<String>) -> Self {
        let action = action.into();
        Self { event: action.clone(), scene: Some(scene), action: Some(action), ..Self::default() }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Normalized reply handed back to the chat transport for rendering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneResponse {
    pub message_text: String,
    pub buttons: Vec<Button>,
    pub escalate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_event: Option<LogEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_scene: Option<SceneKind>,
}

impl SceneResponse {
    pub fn text(message_text: impl Into<String>) -> Self {
        Self { message_text: message_text.into(), ..Self::default() }
    }

    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn escalated(mut self) -> Self {
        self.escalate = true;
        self
    }

    pub fn with_log_event(mut self, log_event: LogEvent) -> Self {
        self.log_event = Some(log_event);
        self
    }
}
