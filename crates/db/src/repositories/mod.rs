use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use scenebot_core::domain::conversation::{
    ConversationMessage, InteractionRecord, SceneStats, SceneTransitionRecord, SurveyAnswer,
};
use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::user::UserId;

pub mod conversation;
pub mod memory;
pub mod session;

pub use conversation::SqlConversationRepository;
pub use memory::{InMemoryConversationRepository, InMemorySessionStore};
pub use session::SqlSessionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value cache with per-entry expiry. Expired entries read as absent and
/// are reclaimed lazily by the backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), RepositoryError>;
    async fn delete(&self, key: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Most recent messages for the user, oldest first.
    async fn recent_messages(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, RepositoryError>;

    async fn append_message(&self, message: ConversationMessage) -> Result<(), RepositoryError>;

    async fn record_survey_answer(&self, answer: SurveyAnswer) -> Result<(), RepositoryError>;

    /// `question: answer` lines in answer order, or `None` before any answer.
    async fn survey_summary(&self, user_id: UserId) -> Result<Option<String>, RepositoryError>;

    async fn record_interaction(&self, record: InteractionRecord) -> Result<(), RepositoryError>;

    async fn record_transition(&self, record: SceneTransitionRecord)
        -> Result<(), RepositoryError>;

    /// Per-scene transition and interaction totals at or after `since`.
    /// Scenes with no activity are left out; order follows [`SceneKind::ALL`].
    async fn scene_stats(&self, since: DateTime<Utc>) -> Result<Vec<SceneStats>, RepositoryError>;

    /// Discards work left open by a failed request.
    async fn rollback(&self) -> Result<(), RepositoryError>;
}

pub(crate) fn summarize_answers<'a>(
    answers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Option<String> {
    let lines = answers
        .into_iter()
        .map(|(question, answer)| format!("{question}: {answer}"))
        .collect::<Vec<_>>();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Interaction totals for one scene: count, confidence sum, escalations.
pub(crate) struct InteractionTally {
    pub scene: SceneKind,
    pub interactions: u64,
    pub confidence_sum: f64,
    pub escalations: u64,
}

pub(crate) fn merge_scene_stats(
    transitions: impl IntoIterator<Item = (SceneKind, u64)>,
    interactions: impl IntoIterator<Item = InteractionTally>,
) -> Vec<SceneStats> {
    let mut by_scene = BTreeMap::new();
    for (scene, count) in transitions {
        by_scene.entry(scene).or_insert_with(|| SceneStats::empty(scene)).transitions += count;
    }
    for tally in interactions {
        let stats = by_scene.entry(tally.scene).or_insert_with(|| SceneStats::empty(tally.scene));
        stats.interactions += tally.interactions;
        stats.escalations += tally.escalations;
        // Holds the sum until the final pass below.
        stats.avg_confidence += tally.confidence_sum;
    }
    by_scene
        .into_values()
        .map(|mut stats| {
            stats.avg_confidence = if stats.interactions == 0 {
                0.0
            } else {
                stats.avg_confidence / stats.interactions as f64
            };
            stats
        })
        .filter(|stats| !stats.is_empty())
        .collect()
}
