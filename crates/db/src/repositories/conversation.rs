use chrono::{DateTime, Utc};
use sqlx::Row;

use scenebot_core::domain::conversation::{
    ConversationMessage, InteractionRecord, MessageRole, SceneStats, SceneTransitionRecord,
    SurveyAnswer,
};
use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::user::UserId;

use super::{
    merge_scene_stats, summarize_answers, ConversationRepository, InteractionTally,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationMessage, RepositoryError> {
    let user_id: i64 = row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_str: String =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let text: String = row.try_get("text").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = role_str.parse::<MessageRole>().map_err(RepositoryError::Decode)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ConversationMessage { user_id: UserId(user_id), role, text, created_at })
}

fn decode_scene(raw: &str) -> Result<SceneKind, RepositoryError> {
    SceneKind::parse(raw).ok_or_else(|| RepositoryError::Decode(format!("unknown scene `{raw}`")))
}

fn decode_count(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<u64, RepositoryError> {
    let count: i64 = row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    u64::try_from(count).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn recent_messages(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT user_id, role, text, created_at
             FROM conversation_message
             WHERE user_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(user_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn append_message(&self, message: ConversationMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversation_message (user_id, role, text, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(message.user_id.0)
        .bind(message.role.as_str())
        .bind(&message.text)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_survey_answer(&self, answer: SurveyAnswer) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO survey_answer (user_id, question_code, answer_code, answered_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(answer.user_id.0)
        .bind(&answer.question_code)
        .bind(&answer.answer_code)
        .bind(answer.answered_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn survey_summary(&self, user_id: UserId) -> Result<Option<String>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT question_code, answer_code
             FROM survey_answer
             WHERE user_id = ?
             ORDER BY answered_at ASC, id ASC",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut answers = Vec::with_capacity(rows.len());
        for row in &rows {
            let question: String =
                row.try_get("question_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let answer: String =
                row.try_get("answer_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            answers.push((question, answer));
        }

        Ok(summarize_answers(
            answers.iter().map(|(question, answer)| (question.as_str(), answer.as_str())),
        ))
    }

    async fn record_interaction(&self, record: InteractionRecord) -> Result<(), RepositoryError> {
        let payload = serde_json::Value::Object(record.payload).to_string();
        sqlx::query(
            "INSERT INTO scene_interaction
                (user_id, scene, action, confidence, escalated, payload, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.user_id.0)
        .bind(record.scene.as_str())
        .bind(&record.action)
        .bind(record.confidence)
        .bind(record.escalated)
        .bind(payload)
        .bind(record.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_transition(
        &self,
        record: SceneTransitionRecord,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO scene_transition (user_id, from_scene, to_scene, occurred_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(record.user_id.0)
        .bind(record.from_scene.map(|scene| scene.as_str()))
        .bind(record.to_scene.as_str())
        .bind(record.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scene_stats(&self, since: DateTime<Utc>) -> Result<Vec<SceneStats>, RepositoryError> {
        let since = since.to_rfc3339();
        let transition_rows = sqlx::query(
            "SELECT to_scene AS scene, COUNT(*) AS transitions
             FROM scene_transition
             WHERE occurred_at >= ?
             GROUP BY to_scene",
        )
        .bind(&since)
        .fetch_all(&self.pool)
        .await?;
        let interaction_rows = sqlx::query(
            "SELECT scene,
                    COUNT(*) AS interactions,
                    TOTAL(confidence) AS confidence_sum,
                    TOTAL(escalated) AS escalations
             FROM scene_interaction
             WHERE occurred_at >= ?
             GROUP BY scene",
        )
        .bind(&since)
        .fetch_all(&self.pool)
        .await?;

        let mut transitions = Vec::with_capacity(transition_rows.len());
        for row in &transition_rows {
            let scene: String =
                row.try_get("scene").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            transitions.push((decode_scene(&scene)?, decode_count(row, "transitions")?));
        }

        let mut interactions = Vec::with_capacity(interaction_rows.len());
        for row in &interaction_rows {
            let scene: String =
                row.try_get("scene").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let confidence_sum: f64 =
                row.try_get("confidence_sum").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let escalations: f64 =
                row.try_get("escalations").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            interactions.push(InteractionTally {
                scene: decode_scene(&scene)?,
                interactions: decode_count(row, "interactions")?,
                confidence_sum,
                escalations: escalations as u64,
            });
        }

        Ok(merge_scene_stats(transitions, interactions))
    }

    /// Statements run in autocommit mode against the pool, so there is no
    /// open transaction to discard.
    async fn rollback(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
