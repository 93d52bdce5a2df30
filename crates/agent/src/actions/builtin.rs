use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use scenebot_core::domain::conversation::{ConversationMessage, MessageRole};
use scenebot_core::domain::response::Button;
use scenebot_core::domain::user::FunnelStage;

use super::{ActionContext, ActionHandler, ActionOutcome, ActionRegistry, HandlerResult};
use crate::llm::{button_from_map, value_to_text, LlmContext};
use crate::providers::{Material, Product};

/// Action names the sales scenario references before their business logic exists.
pub const PLACEHOLDER_ACTIONS: [&str; 13] = [
    "ask_survey_question",
    "calculate_segment",
    "propose_slots",
    "schedule_consultation",
    "schedule_reminder",
    "create_lead",
    "post_manager_notification",
    "collect_payment_preferences",
    "generate_payment_link",
    "schedule_followup",
    "enqueue_ab_test",
    "trigger_onboarding",
    "evaluate_reengagement",
];

const DEFAULT_MATERIALS_LIMIT: usize = 3;
const DEFAULT_MATERIALS_STAGE: &str = "engaged";

pub(super) fn register_defaults(registry: &mut ActionRegistry) {
    registry.register("noop", Noop);
    registry.register("log_event", LogEventAction);
    registry.register("store_context", StoreContext);
    registry.register("send_message", SendMessage);
    registry.register("send_llm_response", SendLlmResponse);
    registry.register("deliver_bonus", DeliverBonus);
    registry.register("send_materials", SendMaterials);
    registry.register("offer_options", OfferOptions);
}

fn param_text(params: &Map<String, Value>, key: &str) -> Option<String> {
    params.get(key).map(value_to_text).filter(|text| !text.is_empty())
}

/// Strict parsing for `send_message`: anything but a list of mappings is an error.
fn strict_buttons(action: &str, raw: Option<&Value>) -> Result<Vec<Button>> {
    let items = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => bail!("{action}: `buttons` must be a list"),
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) if is_button_like(map) => Ok(button_from_map(map)),
            Value::Object(_) => bail!("{action}: button #{index} needs text, url or callback_data"),
            _ => bail!("{action}: button #{index} must be a mapping"),
        })
        .collect()
}

fn is_button_like(map: &Map<String, Value>) -> bool {
    ["text", "url", "callback_data", "callback"]
        .iter()
        .any(|key| map.get(*key).map(value_to_text).is_some_and(|text| !text.is_empty()))
}

/// Lenient parsing: malformed entries are skipped.
fn lenient_buttons(raw: Option<&Value>) -> Vec<Button> {
    raw.and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).map(button_from_map).collect())
        .unwrap_or_default()
}

struct Noop;

#[async_trait]
impl ActionHandler for Noop {
    async fn call(
        &self,
        context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<HandlerResult> {
        debug!(
            event_name = "action.noop",
            user_id = context.user.id.0,
            param_count = params.len(),
            "noop action"
        );
        Ok(HandlerResult::Nothing)
    }
}

struct LogEventAction;

#[async_trait]
impl ActionHandler for LogEventAction {
    async fn call(
        &self,
        context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<HandlerResult> {
        let event_type = param_text(params, "event_type").unwrap_or_else(|| "unknown".to_string());
        let payload = params.get("payload").cloned().unwrap_or_else(|| json!({}));
        info!(
            event_name = "scenario.event_logged",
            user_id = context.user.id.0,
            event_type = %event_type,
            payload = %payload,
            "scenario event logged"
        );
        Ok(ActionOutcome::default().with_data("logged_event", event_type).into())
    }
}

struct StoreContext;

#[async_trait]
impl ActionHandler for StoreContext {
    async fn call(
        &self,
        context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<HandlerResult> {
        context.extras.extend(params.clone());
        Ok(ActionOutcome::default().with_data("stored", Value::Object(params.clone())).into())
    }
}

struct SendMessage;

#[async_trait]
impl ActionHandler for SendMessage {
    async fn call(
        &self,
        _context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<HandlerResult> {
        let template = params.get("template").map(value_to_text).unwrap_or_default();
        let buttons = strict_buttons("send_message", params.get("buttons"))?;
        Ok(ActionOutcome::message(template).with_buttons(buttons).into())
    }
}

struct SendLlmResponse;

impl SendLlmResponse {
    fn history(context: &ActionContext) -> Vec<ConversationMessage> {
        let Some(items) = context.extras.get("messages_history").and_then(Value::as_array) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|item| {
                let text = item.get("text").and_then(Value::as_str)?;
                let role = item
                    .get("role")
                    .and_then(Value::as_str)
                    .and_then(|role| role.parse::<MessageRole>().ok())
                    .unwrap_or(MessageRole::User);
                let mut message = ConversationMessage::user(context.user.id, text);
                message.role = role;
                Some(message)
            })
            .collect()
    }

    fn typed_extra<T: serde::de::DeserializeOwned>(context: &ActionContext, key: &str) -> Vec<T> {
        context
            .extras
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items.iter().filter_map(|item| serde_json::from_value(item.clone()).ok()).collect()
            })
            .unwrap_or_default()
    }

    fn funnel_stage(context: &ActionContext, params: &Map<String, Value>) -> FunnelStage {
        params
            .get("context")
            .and_then(Value::as_object)
            .and_then(|inner| inner.get("funnel_stage"))
            .and_then(Value::as_str)
            .and_then(|stage| stage.parse::<FunnelStage>().ok())
            .unwrap_or(context.user.funnel_stage)
    }
}

#[async_trait]
impl ActionHandler for SendLlmResponse {
    async fn call(
        &self,
        context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<HandlerResult> {
        let scenario_prompt = match param_text(params, "prompt") {
            Some(prompt) => {
                let stem = std::path::Path::new(&prompt)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or(prompt.as_str())
                    .to_string();
                context.services.prompts.load_prompt(&stem).await
            }
            None => None,
        };

        let mut llm_context = LlmContext::new(context.user.clone(), Self::history(context));
        llm_context.funnel_stage = Self::funnel_stage(context, params);
        llm_context.scenario_prompt = scenario_prompt;
        llm_context.survey_summary = context
            .extras
            .get("survey_summary")
            .and_then(Value::as_str)
            .map(str::to_string);
        llm_context.candidate_materials = Self::typed_extra::<Material>(context, "candidate_materials");
        llm_context.relevant_products = Self::typed_extra::<Product>(context, "relevant_products");

        let response = context.services.llm.generate_response(&llm_context).await?;

        Ok(ActionOutcome::message(response.reply_text.clone())
            .with_buttons(response.typed_buttons())
            .with_data("next_action", response.next_action.as_str())
            .with_data("confidence", response.confidence)
            .with_data("safety", response.safety_codes())
            .into())
    }
}

struct DeliverBonus;

#[async_trait]
impl ActionHandler for DeliverBonus {
    async fn call(
        &self,
        context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<HandlerResult> {
        let text = context.services.bonus.welcome_bonus_text().await?;
        let mut buttons = lenient_buttons(params.get("buttons"));
        if buttons.is_empty() {
            buttons = vec![
                Button::callback("🎯 Take the quiz", "survey:start"),
                Button::callback("📞 Consultation", "consult:schedule"),
            ];
        }
        Ok(ActionOutcome::message(text)
            .with_buttons(buttons)
            .with_data("bonus_delivered", true)
            .into())
    }
}

struct SendMaterials;

impl SendMaterials {
    /// Missing, null or zero falls back to the default; anything else is at least 1.
    fn limit(raw: Option<&Value>) -> usize {
        let parsed = match raw {
            Some(Value::Number(number)) => number.as_i64().or_else(|| number.as_f64().map(|f| f as i64)),
            Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
            _ => None,
        };
        match parsed {
            None | Some(0) => DEFAULT_MATERIALS_LIMIT,
            Some(value) => usize::try_from(value.max(1)).unwrap_or(DEFAULT_MATERIALS_LIMIT),
        }
    }
}

#[async_trait]
impl ActionHandler for SendMaterials {
    async fn call(
        &self,
        context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<HandlerResult> {
        let segment = param_text(params, "segment")
            .unwrap_or_else(|| context.user.segment_label().to_string());
        let stage = param_text(params, "funnel_stage")
            .or_else(|| param_text(params, "stage"))
            .unwrap_or_else(|| DEFAULT_MATERIALS_STAGE.to_string());
        let limit = Self::limit(params.get("limit"));

        let provider = &context.services.materials;
        let mut materials = provider.materials_by_context(&stage, &segment, limit).await?;
        if materials.is_empty() {
            materials = provider.materials_for_segment(&segment, limit).await?;
        }

        let ids = materials.iter().map(|material| Value::from(material.id.clone())).collect::<Vec<_>>();
        Ok(ActionOutcome::message(provider.format_for_delivery(&materials))
            .with_data("materials", Value::Array(ids))
            .into())
    }
}

struct OfferOptions;

#[async_trait]
impl ActionHandler for OfferOptions {
    async fn call(
        &self,
        _context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<HandlerResult> {
        let template =
            param_text(params, "template").unwrap_or_else(|| "Choose your next step:".to_string());
        let mut buttons = lenient_buttons(params.get("buttons"));
        if buttons.is_empty() {
            buttons = vec![Button::callback("⬅️ Back", "noop:return")];
        }
        Ok(ActionOutcome::message(template).with_buttons(buttons).into())
    }
}
