use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Map;
use sqlx::Row;

use scenebot_core::domain::conversation::{
    ConversationMessage, InteractionRecord, SceneStats, SceneTransitionRecord, SurveyAnswer,
};
use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::user::UserId;
use scenebot_db::migrations::run_pending;
use scenebot_db::{
    connect_with_settings, ConversationRepository, DbPool, SessionStore, SqlConversationRepository,
    SqlSessionStore,
};

type TestResult<T = ()> = Result<T, String>;

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left, $right
            ));
        }
    };
}

async fn migrated_pool() -> TestResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    Ok(pool)
}

#[tokio::test]
async fn sql_session_store_overwrites_and_expires() -> TestResult {
    let pool = migrated_pool().await?;
    let store = SqlSessionStore::new(pool.clone());

    store
        .set("scene_session:7", "{\"current_state\":\"START\"}".to_string(), Duration::from_secs(60))
        .await
        .map_err(|error| error.to_string())?;
    store
        .set("scene_session:7", "{\"current_state\":\"HELLO\"}".to_string(), Duration::from_secs(60))
        .await
        .map_err(|error| error.to_string())?;

    let payload = store.get("scene_session:7").await.map_err(|error| error.to_string())?;
    require_eq!(payload.as_deref(), Some("{\"current_state\":\"HELLO\"}"));

    store
        .set("scene_session:8", "{}".to_string(), Duration::ZERO)
        .await
        .map_err(|error| error.to_string())?;
    let expired = store.get("scene_session:8").await.map_err(|error| error.to_string())?;
    require_eq!(expired, None::<String>);

    let purged = store
        .purge_expired(Utc::now() + ChronoDuration::seconds(1))
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(purged, 1);

    let remaining = sqlx::query("SELECT COUNT(*) AS count FROM scene_session_cache")
        .fetch_one(&pool)
        .await
        .map_err(|error| error.to_string())?
        .get::<i64, _>("count");
    require_eq!(remaining, 1);
    Ok(())
}

#[tokio::test]
async fn sql_conversation_repository_keeps_history_and_answers() -> TestResult {
    let pool = migrated_pool().await?;
    let repo = SqlConversationRepository::new(pool.clone());
    let base = Utc::now();

    for index in 0..3_i64 {
        let mut message = ConversationMessage::user(UserId(11), format!("q{index}"));
        message.created_at = base + ChronoDuration::seconds(index);
        repo.append_message(message).await.map_err(|error| error.to_string())?;
    }

    let recent = repo.recent_messages(UserId(11), 2).await.map_err(|error| error.to_string())?;
    let texts = recent.iter().map(|message| message.text.clone()).collect::<Vec<_>>();
    require_eq!(texts, vec!["q1".to_string(), "q2".to_string()]);

    repo.record_survey_answer(SurveyAnswer {
        user_id: UserId(11),
        question_code: "experience".to_string(),
        answer_code: "some_exp".to_string(),
        answered_at: base,
    })
    .await
    .map_err(|error| error.to_string())?;
    let summary = repo.survey_summary(UserId(11)).await.map_err(|error| error.to_string())?;
    require_eq!(summary.as_deref(), Some("experience: some_exp"));
    let none = repo.survey_summary(UserId(12)).await.map_err(|error| error.to_string())?;
    require_eq!(none, None::<String>);

    repo.record_interaction(InteractionRecord {
        user_id: UserId(11),
        scene: SceneKind::Trader,
        action: "offer_consult".to_string(),
        confidence: 0.75,
        escalated: false,
        payload: Map::new(),
        occurred_at: base,
    })
    .await
    .map_err(|error| error.to_string())?;

    let scene = sqlx::query("SELECT scene FROM scene_interaction WHERE user_id = 11")
        .fetch_one(&pool)
        .await
        .map_err(|error| error.to_string())?
        .get::<String, _>("scene");
    require_eq!(scene, "trader".to_string());

    repo.rollback().await.map_err(|error| error.to_string())?;
    Ok(())
}

#[tokio::test]
async fn sql_scene_stats_aggregate_transitions_and_interactions() -> TestResult {
    let pool = migrated_pool().await?;
    let repo = SqlConversationRepository::new(pool);
    let now = Utc::now();
    let stale = now - ChronoDuration::days(10);

    for (from, to, at) in [
        (None, SceneKind::Skeptic, now),
        (Some(SceneKind::Skeptic), SceneKind::Investor, now),
        (None, SceneKind::Investor, stale),
    ] {
        repo.record_transition(SceneTransitionRecord {
            user_id: UserId(21),
            from_scene: from,
            to_scene: to,
            occurred_at: at,
        })
        .await
        .map_err(|error| error.to_string())?;
    }
    for (confidence, escalated) in [(0.5, false), (0.25, true)] {
        repo.record_interaction(InteractionRecord {
            user_id: UserId(21),
            scene: SceneKind::Skeptic,
            action: "provide_proof".to_string(),
            confidence,
            escalated,
            payload: Map::new(),
            occurred_at: now,
        })
        .await
        .map_err(|error| error.to_string())?;
    }

    let stats = repo
        .scene_stats(now - ChronoDuration::days(7))
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(stats.len(), 2);

    let investor = SceneStats { transitions: 1, ..SceneStats::empty(SceneKind::Investor) };
    require_eq!(stats[0].clone(), investor);

    let skeptic = &stats[1];
    require_eq!(skeptic.scene, SceneKind::Skeptic);
    require_eq!(skeptic.transitions, 1);
    require_eq!(skeptic.interactions, 2);
    require_eq!(skeptic.escalations, 1);
    if (skeptic.avg_confidence - 0.375).abs() > 1e-9 {
        return Err(format!("unexpected average confidence {}", skeptic.avg_confidence));
    }

    let nothing_recent = repo
        .scene_stats(now + ChronoDuration::seconds(1))
        .await
        .map_err(|error| error.to_string())?;
    require_eq!(nothing_recent.len(), 0);
    Ok(())
}
