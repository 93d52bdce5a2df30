use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use scenebot_core::domain::conversation::{
    ConversationMessage, InteractionRecord, SceneStats, SceneTransitionRecord, SurveyAnswer,
};
use scenebot_core::domain::user::UserId;

use super::{
    merge_scene_stats, summarize_answers, ConversationRepository, InteractionTally,
    RepositoryError, SessionStore,
};

#[derive(Clone, Debug)]
struct CacheEntry {
    payload: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemorySessionStore {
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Removes entries that expired at or before `now`. Returns the number removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

pub(crate) fn expiry_from_now(ttl: Duration) -> Result<DateTime<Utc>, RepositoryError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|error| RepositoryError::Decode(format!("invalid ttl: {error}")))?;
    Ok(Utc::now() + ttl)
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let entries = self.entries.read().await;
        let now = Utc::now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.payload.clone()))
    }

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), RepositoryError> {
        let expires_at = expiry_from_now(ttl)?;
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(key.to_string(), CacheEntry { payload, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    messages: RwLock<Vec<ConversationMessage>>,
    answers: RwLock<Vec<SurveyAnswer>>,
    interactions: RwLock<Vec<InteractionRecord>>,
    transitions: RwLock<Vec<SceneTransitionRecord>>,
    rollbacks: AtomicUsize,
}

impl InMemoryConversationRepository {
    pub async fn interactions(&self) -> Vec<InteractionRecord> {
        self.interactions.read().await.clone()
    }

    pub async fn transitions(&self) -> Vec<SceneTransitionRecord> {
        self.transitions.read().await.clone()
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn recent_messages(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut recent = messages
            .iter()
            .rev()
            .filter(|message| message.user_id == user_id)
            .take(limit)
            .cloned()
            .collect::<Vec<_>>();
        recent.reverse();
        Ok(recent)
    }

    async fn append_message(&self, message: ConversationMessage) -> Result<(), RepositoryError> {
        self.messages.write().await.push(message);
        Ok(())
    }

    async fn record_survey_answer(&self, answer: SurveyAnswer) -> Result<(), RepositoryError> {
        self.answers.write().await.push(answer);
        Ok(())
    }

    async fn survey_summary(&self, user_id: UserId) -> Result<Option<String>, RepositoryError> {
        let answers = self.answers.read().await;
        Ok(summarize_answers(
            answers
                .iter()
                .filter(|answer| answer.user_id == user_id)
                .map(|answer| (answer.question_code.as_str(), answer.answer_code.as_str())),
        ))
    }

    async fn record_interaction(&self, record: InteractionRecord) -> Result<(), RepositoryError> {
        self.interactions.write().await.push(record);
        Ok(())
    }

    async fn record_transition(
        &self,
        record: SceneTransitionRecord,
    ) -> Result<(), RepositoryError> {
        self.transitions.write().await.push(record);
        Ok(())
    }

    async fn scene_stats(&self, since: DateTime<Utc>) -> Result<Vec<SceneStats>, RepositoryError> {
        let transitions = self.transitions.read().await;
        let interactions = self.interactions.read().await;
        Ok(merge_scene_stats(
            transitions
                .iter()
                .filter(|record| record.occurred_at >= since)
                .map(|record| (record.to_scene, 1)),
            interactions.iter().filter(|record| record.occurred_at >= since).map(|record| {
                InteractionTally {
                    scene: record.scene,
                    interactions: 1,
                    confidence_sum: record.confidence,
                    escalations: u64::from(record.escalated),
                }
            }),
        ))
    }

    async fn rollback(&self) -> Result<(), RepositoryError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
