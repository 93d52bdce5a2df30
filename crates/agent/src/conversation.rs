//! Shapes stored conversation history into the slices the LLM context carries.

use scenebot_core::domain::conversation::{ConversationMessage, MessageRole};
use scenebot_core::domain::scene::SceneKind;

use crate::llm::QaPair;

pub const HISTORY_LIMIT: usize = 10;
pub const RECENT_LIMIT: usize = 5;
pub const PAIR_LIMIT: usize = 5;

pub fn recent_messages(history: &[ConversationMessage], limit: usize) -> Vec<ConversationMessage> {
    let start = history.len().saturating_sub(limit);
    history[start..].to_vec()
}

/// Each user message paired with the assistant reply right after it. Keeps
/// the last [`PAIR_LIMIT`] pairs.
pub fn question_answer_pairs(history: &[ConversationMessage]) -> Vec<QaPair> {
    let mut pairs = Vec::new();
    let mut pending: Option<&str> = None;
    for message in history {
        match message.role {
            MessageRole::User => pending = Some(message.text.as_str()),
            MessageRole::Assistant => {
                if let Some(question) = pending.take() {
                    pairs.push(QaPair { user: question.to_string(), bot: message.text.clone() });
                }
            }
        }
    }
    let start = pairs.len().saturating_sub(PAIR_LIMIT);
    pairs.split_off(start)
}

pub fn active_function_label(scene: SceneKind, step: &str) -> String {
    if step.is_empty() || step == "initial" {
        format!("scene:{scene}")
    } else {
        format!("scene:{scene}|step:{step}")
    }
}
