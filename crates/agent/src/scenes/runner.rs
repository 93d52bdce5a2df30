use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::{json, Map};
use tracing::{error, info, warn};

use scenebot_core::domain::conversation::{ConversationMessage, InteractionRecord};
use scenebot_core::domain::response::{Button, LogEvent, SceneResponse};
use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::session::SceneState;
use scenebot_core::domain::user::User;
use scenebot_db::ConversationRepository;

use super::ScenePolicy;
use crate::conversation::{
    active_function_label, question_answer_pairs, recent_messages, HISTORY_LIMIT, RECENT_LIMIT,
};
use crate::escalation::EscalationDecision;
use crate::llm::{LlmCapability, LlmContext, NextAction};
use crate::providers::{MaterialsProvider, ProductCatalog};

const CANDIDATE_LIMIT: usize = 3;

/// Per-message pipeline shared by every scene: escalation check, context
/// assembly, model call, policy, bookkeeping.
pub struct SceneRunner {
    llm: Arc<dyn LlmCapability>,
    materials: Arc<dyn MaterialsProvider>,
    products: Arc<dyn ProductCatalog>,
    conversations: Arc<dyn ConversationRepository>,
}

impl SceneRunner {
    pub fn new(
        llm: Arc<dyn LlmCapability>,
        materials: Arc<dyn MaterialsProvider>,
        products: Arc<dyn ProductCatalog>,
        conversations: Arc<dyn ConversationRepository>,
    ) -> Self {
        Self { llm, materials, products, conversations }
    }

    /// Never fails: internal errors become the fallback reply after a
    /// best-effort rollback.
    pub async fn process_message(
        &self,
        scene: &dyn ScenePolicy,
        user: &User,
        message_text: &str,
        state: &mut SceneState,
    ) -> SceneResponse {
        let kind = scene.kind();
        state.attempts_count = state.attempts_count.saturating_add(1);

        if let EscalationDecision::Escalate { reason, user_message } =
            scene.escalation().evaluate(message_text, state)
        {
            state.escalation_triggered = true;
            info!(
                event_name = "scene.escalated",
                user_id = user.id.0,
                scene = %kind,
                reason = reason.reason_code(),
                attempts = state.attempts_count,
                "conversation handed to a manager"
            );
            return SceneResponse::text(user_message).escalated().with_log_event(
                LogEvent::scene_action(kind, "escalated")
                    .with_attribute("reason", reason.reason_code()),
            );
        }

        match self.respond(scene, user, message_text, state).await {
            Ok(response) => response,
            Err(err) => {
                error!(
                    event_name = "scene.processing_failed",
                    user_id = user.id.0,
                    scene = %kind,
                    error = %err,
                    "scene processing failed"
                );
                if let Err(rollback_error) = self.conversations.rollback().await {
                    warn!(
                        event_name = "scene.rollback_failed",
                        user_id = user.id.0,
                        scene = %kind,
                        error = %rollback_error,
                        "rollback after scene error failed"
                    );
                }
                fallback_response(kind)
            }
        }
    }

    pub async fn build_context(
        &self,
        scene: &dyn ScenePolicy,
        user: &User,
        message_text: &str,
        state: &SceneState,
    ) -> Result<LlmContext> {
        let mut history = self.conversations.recent_messages(user.id, HISTORY_LIMIT).await?;
        if !message_text.is_empty() {
            history.push(ConversationMessage::user(user.id, message_text));
        }

        let materials =
            self.materials.materials_for_segment(user.segment_label(), CANDIDATE_LIMIT).await?;
        let mut products = self.products.suitable_products(user).await?;
        products.truncate(CANDIDATE_LIMIT);
        let survey_summary = self.conversations.survey_summary(user.id).await?;
        let active_function = active_function_label(scene.kind(), &state.current_step);

        info!(
            event_name = "scene.context_built",
            user_id = user.id.0,
            scene = %scene.kind(),
            active_function = %active_function,
            materials = materials.len(),
            products = products.len(),
            "llm context built"
        );

        let mut context = LlmContext::new(user.clone(), Vec::new());
        context.recent_messages = recent_messages(&history, RECENT_LIMIT);
        context.conversation_pairs = question_answer_pairs(&history);
        context.messages_history = history;
        context.survey_summary = survey_summary;
        context.candidate_materials = materials;
        context.product_focus = products.first().cloned();
        context.relevant_products = products;
        context.active_function = Some(active_function);
        context.scene_prompt = Some(scene.prompt());
        Ok(context)
    }

    async fn respond(
        &self,
        scene: &dyn ScenePolicy,
        user: &User,
        message_text: &str,
        state: &mut SceneState,
    ) -> Result<SceneResponse> {
        let kind = scene.kind();
        let context = self.build_context(scene, user, message_text, state).await?;
        let mut response = self.llm.generate_response(&context).await?;
        let raw_confidence = response.confidence;

        scene.apply_policy(user, &mut response, state);
        state.record_confidence(raw_confidence);
        state.last_action = response.next_action.as_str().to_string();
        let next_scene = scene.next_scene(user, &response, state);
        let escalate = response.next_action == NextAction::EscalateToManager;

        let mut payload = Map::new();
        payload.insert("bot_response_length".to_string(), json!(response.reply_text.chars().count()));
        payload.insert("next_action".to_string(), json!(response.next_action.as_str()));
        payload.insert("confidence".to_string(), json!(raw_confidence));
        payload.insert("safety_issues".to_string(), json!(response.safety_issues.len()));
        self.conversations
            .record_interaction(InteractionRecord {
                user_id: user.id,
                scene: kind,
                action: response.next_action.as_str().to_string(),
                confidence: raw_confidence,
                escalated: escalate,
                payload,
                occurred_at: Utc::now(),
            })
            .await?;

        if !message_text.is_empty() {
            self.conversations.append_message(ConversationMessage::user(user.id, message_text)).await?;
        }
        self.conversations
            .append_message(ConversationMessage::assistant(user.id, response.reply_text.clone()))
            .await?;

        let mut scene_response = SceneResponse::text(response.reply_text.clone())
            .with_buttons(response.typed_buttons())
            .with_log_event(
                LogEvent::scene_action(kind, response.next_action.as_str())
                    .with_attribute("confidence", raw_confidence),
            );
        scene_response.next_scene = next_scene;
        scene_response.escalate = escalate;
        Ok(scene_response)
    }
}

pub fn fallback_response(scene: SceneKind) -> SceneResponse {
    SceneResponse::text(
        "😔 Sorry, we are having technical difficulties. Repeat your question or contact our manager.",
    )
    .with_buttons(vec![
        Button::callback("👤 Manager", "manager:request"),
        Button::callback("🔄 Try again", "retry"),
    ])
    .with_log_event(
        LogEvent::scene_action(scene, "fallback").with_attribute("reason", "processing_error"),
    )
}
