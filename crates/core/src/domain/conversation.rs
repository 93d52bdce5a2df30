use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::scene::SceneKind;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" | "bot" => Ok(Self::Assistant),
            other => Err(format!("unsupported message role `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub user_id: UserId,
    pub role: MessageRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(user_id: UserId, text: impl Into<String>) -> Self {
        Self { user_id, role: MessageRole::User, text: text.into(), created_at: Utc::now() }
    }

    pub fn assistant(user_id: UserId, text: impl Into<String>) -> Self {
        Self { user_id, role: MessageRole::Assistant, text: text.into(), created_at: Utc::now() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurveyAnswer {
    pub user_id: UserId,
    pub question_code: String,
    pub answer_code: String,
    pub answered_at: DateTime<Utc>,
}

/// One processed message in a legacy scene, kept for analytics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: UserId,
    pub scene: SceneKind,
    pub action: String,
    pub confidence: f64,
    pub escalated: bool,
    pub payload: Map<String, Value>,
    pub occurred_at: DateTime<Utc>,
}

/// A move between rule-based scenes. `from_scene` is `None` on a user's
/// first scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneTransitionRecord {
    pub user_id: UserId,
    pub from_scene: Option<SceneKind>,
    pub to_scene: SceneKind,
    pub occurred_at: DateTime<Utc>,
}

/// Usage of one scene over an analytics window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneStats {
    pub scene: SceneKind,
    /// Transitions into the scene.
    pub transitions: u64,
    pub interactions: u64,
    /// Mean interaction confidence, 0.0 without interactions.
    pub avg_confidence: f64,
    pub escalations: u64,
}

impl SceneStats {
    pub fn empty(scene: SceneKind) -> Self {
        Self { scene, transitions: 0, interactions: 0, avg_confidence: 0.0, escalations: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.transitions == 0 && self.interactions == 0
    }
}
