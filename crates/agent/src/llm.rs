use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use scenebot_core::domain::conversation::ConversationMessage;
use scenebot_core::domain::response::Button;
use scenebot_core::domain::user::{FunnelStage, User};

use crate::providers::{Material, Product};
use crate::scenes::ScenePrompt;

/// Next step the model suggests. Scene policies rewrite it before it is acted on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NextAction {
    Ask,
    Educate,
    ShowMaterials,
    ShowCases,
    ShowExclusive,
    ShowProof,
    OfferConsult,
    OfferPayment,
    ProvideStrategy,
    ProvideProof,
    AddressConcerns,
    AskPreferences,
    GuideToSurvey,
    PushDecision,
    EscalateToManager,
    Other(String),
}

impl NextAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ask => "ask",
            Self::Educate => "educate",
            Self::ShowMaterials => "show_materials",
            Self::ShowCases => "show_cases",
            Self::ShowExclusive => "show_exclusive",
            Self::ShowProof => "show_proof",
            Self::OfferConsult => "offer_consult",
            Self::OfferPayment => "offer_payment",
            Self::ProvideStrategy => "provide_strategy",
            Self::ProvideProof => "provide_proof",
            Self::AddressConcerns => "address_concerns",
            Self::AskPreferences => "ask_preferences",
            Self::GuideToSurvey => "guide_to_survey",
            Self::PushDecision => "push_decision",
            Self::EscalateToManager => "escalate_to_manager",
            Self::Other(value) => value,
        }
    }
}

impl From<&str> for NextAction {
    fn from(value: &str) -> Self {
        match value {
            "ask" => Self::Ask,
            "educate" => Self::Educate,
            "show_materials" => Self::ShowMaterials,
            "show_cases" => Self::ShowCases,
            "show_exclusive" => Self::ShowExclusive,
            "show_proof" => Self::ShowProof,
            "offer_consult" => Self::OfferConsult,
            "offer_payment" => Self::OfferPayment,
            "provide_strategy" => Self::ProvideStrategy,
            "provide_proof" => Self::ProvideProof,
            "address_concerns" => Self::AddressConcerns,
            "ask_preferences" => Self::AskPreferences,
            "guide_to_survey" => Self::GuideToSurvey,
            "push_decision" => Self::PushDecision,
            "escalate_to_manager" => Self::EscalateToManager,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for NextAction {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<NextAction> for String {
    fn from(value: NextAction) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetySeverity {
    High,
    Medium,
    Low,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyIssue {
    pub code: String,
    pub original: String,
    pub suggestion: String,
    pub severity: SafetySeverity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub user: String,
    pub bot: String,
}

/// Everything the model sees for one turn.
#[derive(Clone, Debug, PartialEq)]
pub struct LlmContext {
    pub user: User,
    pub messages_history: Vec<ConversationMessage>,
    pub survey_summary: Option<String>,
    pub candidate_materials: Vec<Material>,
    pub relevant_products: Vec<Product>,
    pub funnel_stage: FunnelStage,
    pub scenario_prompt: Option<String>,
    pub scene_prompt: Option<ScenePrompt>,
    pub active_function: Option<String>,
    pub recent_messages: Vec<ConversationMessage>,
    pub conversation_pairs: Vec<QaPair>,
    pub product_focus: Option<Product>,
}

impl LlmContext {
    pub fn new(user: User, messages_history: Vec<ConversationMessage>) -> Self {
        let funnel_stage = user.funnel_stage;
        Self {
            user,
            messages_history,
            survey_summary: None,
            candidate_materials: Vec::new(),
            relevant_products: Vec::new(),
            funnel_stage,
            scenario_prompt: None,
            scene_prompt: None,
            active_function: None,
            recent_messages: Vec::new(),
            conversation_pairs: Vec::new(),
            product_focus: None,
        }
    }
}

/// Structured model output. `buttons` is kept as the model produced it;
/// [`LlmResponse::typed_buttons`] drops entries that are not usable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub reply_text: String,
    #[serde(default)]
    pub buttons: Vec<Value>,
    pub next_action: NextAction,
    pub confidence: f64,
    #[serde(default)]
    pub safety_issues: Vec<SafetyIssue>,
    #[serde(default = "default_is_safe")]
    pub is_safe: bool,
}

fn default_is_safe() -> bool {
    true
}

impl LlmResponse {
    pub fn new(reply_text: impl Into<String>, next_action: NextAction, confidence: f64) -> Self {
        Self {
            reply_text: reply_text.into(),
            buttons: Vec::new(),
            next_action,
            confidence,
            safety_issues: Vec::new(),
            is_safe: true,
        }
    }

    pub fn with_button(mut self, button: Value) -> Self {
        self.buttons.push(button);
        self
    }

    pub fn typed_buttons(&self) -> Vec<Button> {
        self.buttons.iter().filter_map(|raw| raw.as_object().map(button_from_map)).collect()
    }

    pub fn safety_codes(&self) -> Vec<String> {
        self.safety_issues.iter().map(|issue| issue.code.clone()).collect()
    }
}

/// `url` wins over `callback_data`, which wins over `callback`.
pub fn button_from_map(raw: &Map<String, Value>) -> Button {
    let text = raw.get("text").map(value_to_text).unwrap_or_default();
    if let Some(url) = raw.get("url").filter(|value| is_truthy(value)) {
        return Button::url(text, value_to_text(url));
    }
    let callback = raw
        .get("callback_data")
        .filter(|value| is_truthy(value))
        .or_else(|| raw.get("callback").filter(|value| is_truthy(value)))
        .map(value_to_text)
        .unwrap_or_default();
    Button::callback(text, callback)
}

pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

#[async_trait]
pub trait LlmCapability: Send + Sync {
    async fn generate_response(&self, context: &LlmContext) -> Result<LlmResponse>;
}

/// Deterministic capability: replays queued responses, then repeats the
/// fallback. Used by the simulator and in tests.
pub struct StaticLlm {
    queued: Mutex<VecDeque<LlmResponse>>,
    fallback: LlmResponse,
    contexts: Mutex<Vec<LlmContext>>,
}

impl StaticLlm {
    pub fn new(fallback: LlmResponse) -> Self {
        Self { queued: Mutex::new(VecDeque::new()), fallback, contexts: Mutex::new(Vec::new()) }
    }

    pub fn then(self, response: LlmResponse) -> Self {
        match self.queued.lock() {
            Ok(mut queued) => queued.push_back(response),
            Err(poisoned) => poisoned.into_inner().push_back(response),
        }
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.seen_contexts().len()
    }

    pub fn seen_contexts(&self) -> Vec<LlmContext> {
        match self.contexts.lock() {
            Ok(contexts) => contexts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for StaticLlm {
    fn default() -> Self {
        Self::new(
            LlmResponse::new(
                "Thanks for the question! Let's figure out what fits you best.",
                NextAction::Ask,
                0.7,
            )
            .with_button(serde_json::json!({"text": "🎯 Take the quiz", "callback": "survey:start"})),
        )
    }
}

#[async_trait]
impl LlmCapability for StaticLlm {
    async fn generate_response(&self, context: &LlmContext) -> Result<LlmResponse> {
        match self.contexts.lock() {
            Ok(mut contexts) => contexts.push(context.clone()),
            Err(poisoned) => poisoned.into_inner().push(context.clone()),
        }
        let next = match self.queued.lock() {
            Ok(mut queued) => queued.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}
