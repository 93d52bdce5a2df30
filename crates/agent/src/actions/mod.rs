//! Named, async entry-step handlers for the scenario graph.
//!
//! A registry is built explicitly per engine. Default wiring registers the
//! built-in actions and a placeholder for every action name the sales
//! scenario references but nothing implements yet. Placeholders report
//! [`StepOutcome::NotImplemented`] instead of silently succeeding.

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, warn, Instrument, Span};

use scenebot_core::domain::response::Button;
use scenebot_core::domain::user::User;

use crate::llm::LlmCapability;
use crate::providers::{BonusProvider, MaterialsProvider, PromptLoader};

pub use builtin::PLACEHOLDER_ACTIONS;

/// Collaborators reachable from action handlers.
#[derive(Clone)]
pub struct ActionServices {
    pub llm: Arc<dyn LlmCapability>,
    pub bonus: Arc<dyn BonusProvider>,
    pub materials: Arc<dyn MaterialsProvider>,
    pub prompts: Arc<dyn PromptLoader>,
}

/// State for one `process_trigger` call. `extras` is shared across the entry
/// steps of the state being entered.
pub struct ActionContext {
    pub user: User,
    pub chat_id: Option<i64>,
    pub extras: Map<String, Value>,
    pub span: Span,
    pub services: Arc<ActionServices>,
}

impl ActionContext {
    pub fn new(user: User, chat_id: Option<i64>, services: Arc<ActionServices>) -> Self {
        let span = tracing::info_span!("scene_action", user_id = user.id.0);
        Self { user, chat_id, extras: Map::new(), span, services }
    }

    pub fn with_extras(mut self, extras: Map<String, Value>) -> Self {
        self.extras = extras;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActionOutcome {
    pub message_text: Option<String>,
    pub buttons: Vec<Button>,
    pub data: Map<String, Value>,
}

impl ActionOutcome {
    pub fn message(text: impl Into<String>) -> Self {
        Self { message_text: Some(text.into()), ..Self::default() }
    }

    pub fn data(data: Map<String, Value>) -> Self {
        Self { data, ..Self::default() }
    }

    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Later non-empty text and buttons replace earlier ones; data is merged.
    pub fn fold(&mut self, next: ActionOutcome) {
        if let Some(text) = next.message_text.filter(|text| !text.is_empty()) {
            self.message_text = Some(text);
        }
        if !next.buttons.is_empty() {
            self.buttons = next.buttons;
        }
        self.data.extend(next.data);
    }
}

/// What a handler hands back before the registry normalizes it.
#[derive(Clone, Debug, PartialEq)]
pub enum HandlerResult {
    Nothing,
    Outcome(ActionOutcome),
    Value(Value),
    NotImplemented,
}

impl From<ActionOutcome> for HandlerResult {
    fn from(outcome: ActionOutcome) -> Self {
        Self::Outcome(outcome)
    }
}

impl From<Value> for HandlerResult {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Empty,
    Completed(ActionOutcome),
    NotImplemented { action: String },
}

impl StepOutcome {
    pub fn into_outcome(self) -> Option<ActionOutcome> {
        match self {
            Self::Completed(outcome) => Some(outcome),
            Self::Empty | Self::NotImplemented { .. } => None,
        }
    }
}

/// Only the action name is displayed; `reason` stays in logs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("action `{action}` failed")]
pub struct ActionExecutionError {
    pub action: String,
    pub reason: String,
}

impl ActionExecutionError {
    pub fn not_registered(action: &str) -> Self {
        Self { action: action.to_string(), reason: "action is not registered".to_string() }
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(
        &self,
        context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<HandlerResult>;
}

struct Placeholder {
    name: String,
}

#[async_trait]
impl ActionHandler for Placeholder {
    async fn call(
        &self,
        context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<HandlerResult> {
        warn!(
            event_name = "action.placeholder",
            action = %self.name,
            user_id = context.user.id.0,
            param_keys = ?params.keys().collect::<Vec<_>>(),
            "placeholder action invoked"
        );
        Ok(HandlerResult::NotImplemented)
    }
}

#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Box<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in actions plus placeholders for the not-yet-implemented names.
    pub fn with_default_actions() -> Self {
        let mut registry = Self::new();
        builtin::register_defaults(&mut registry);
        for name in PLACEHOLDER_ACTIONS {
            registry.ensure_placeholder(name);
        }
        registry
    }

    /// Replaces any handler already registered under `name`.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H)
    where
        H: ActionHandler + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// Registers a placeholder only when `name` has no handler yet.
    pub fn ensure_placeholder(&mut self, name: &str) {
        if !self.handlers.contains_key(name) {
            self.handlers
                .insert(name.to_string(), Box::new(Placeholder { name: name.to_string() }));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names = self.handlers.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub async fn execute(
        &self,
        name: &str,
        context: &mut ActionContext,
        params: &Map<String, Value>,
    ) -> Result<StepOutcome, ActionExecutionError> {
        let Some(handler) = self.handlers.get(name) else {
            error!(
                event_name = "action.not_registered",
                action = name,
                user_id = context.user.id.0,
                "action is not registered"
            );
            return Err(ActionExecutionError::not_registered(name));
        };

        let span = context.span.clone();
        let result = handler.call(context, params).instrument(span).await;

        match result {
            Ok(HandlerResult::Nothing) => Ok(StepOutcome::Empty),
            Ok(HandlerResult::Outcome(outcome)) => Ok(StepOutcome::Completed(outcome)),
            Ok(HandlerResult::Value(value)) => {
                let mut data = Map::new();
                data.insert("result".to_string(), value);
                Ok(StepOutcome::Completed(ActionOutcome::data(data)))
            }
            Ok(HandlerResult::NotImplemented) => {
                Ok(StepOutcome::NotImplemented { action: name.to_string() })
            }
            Err(err) => {
                let rendered = Value::Object(params.clone());
                error!(
                    event_name = "action.failed",
                    action = name,
                    user_id = context.user.id.0,
                    params = %rendered,
                    error = %err,
                    "action failed"
                );
                Err(ActionExecutionError { action: name.to_string(), reason: err.to_string() })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use scenebot_core::domain::response::Button;
    use scenebot_core::domain::user::User;

    use super::{
        ActionContext, ActionExecutionError, ActionHandler, ActionOutcome, ActionRegistry,
        ActionServices, HandlerResult, StepOutcome, PLACEHOLDER_ACTIONS,
    };
    use crate::llm::StaticLlm;
    use crate::providers::{NoPrompts, StaticBonuses, StaticMaterials};

    pub(crate) fn services() -> Arc<ActionServices> {
        Arc::new(ActionServices {
            llm: Arc::new(StaticLlm::default()),
            bonus: Arc::new(StaticBonuses::default()),
            materials: Arc::new(StaticMaterials::sample()),
            prompts: Arc::new(NoPrompts),
        })
    }

    pub(crate) fn context() -> ActionContext {
        ActionContext::new(User::new(42), Some(4200), services())
    }

    struct Fixed(HandlerResult);

    #[async_trait]
    impl ActionHandler for Fixed {
        async fn call(
            &self,
            _context: &mut ActionContext,
            _params: &Map<String, Value>,
        ) -> Result<HandlerResult> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl ActionHandler for Broken {
        async fn call(
            &self,
            _context: &mut ActionContext,
            _params: &Map<String, Value>,
        ) -> Result<HandlerResult> {
            Err(anyhow!("payments backend refused the request"))
        }
    }

    #[tokio::test]
    async fn execute_normalizes_handler_results() {
        let mut registry = ActionRegistry::new();
        registry.register("bare", Fixed(HandlerResult::Value(json!(7))));
        registry.register("typed", Fixed(ActionOutcome::message("hi").into()));
        registry.register("silent", Fixed(HandlerResult::Nothing));
        let mut context = context();

        let bare = registry.execute("bare", &mut context, &Map::new()).await.expect("bare");
        let expected = ActionOutcome::default().with_data("result", 7);
        assert_eq!(bare, StepOutcome::Completed(expected));

        let typed = registry.execute("typed", &mut context, &Map::new()).await.expect("typed");
        assert_eq!(typed, StepOutcome::Completed(ActionOutcome::message("hi")));

        let silent = registry.execute("silent", &mut context, &Map::new()).await.expect("silent");
        assert_eq!(silent, StepOutcome::Empty);
    }

    #[tokio::test]
    async fn handler_failures_surface_only_the_action_name() {
        let mut registry = ActionRegistry::new();
        registry.register("charge", Broken);
        let mut context = context();

        let err = registry.execute("charge", &mut context, &Map::new()).await.expect_err("fails");
        assert_eq!(err.action, "charge");
        assert_eq!(err.to_string(), "action `charge` failed");
        assert!(err.reason.contains("payments backend"));

        let missing =
            registry.execute("ghost", &mut context, &Map::new()).await.expect_err("missing");
        assert_eq!(missing, ActionExecutionError::not_registered("ghost"));
    }

    #[tokio::test]
    async fn failing_handler_with_params_still_reports_the_action() {
        let mut registry = ActionRegistry::new();
        registry.register("charge", Broken);
        let mut context = context();
        let params = json!({"amount": 4900, "currency": "RUB"});
        let params = params.as_object().cloned().unwrap_or_default();

        let err = registry.execute("charge", &mut context, &params).await.expect_err("fails");
        assert_eq!(err.action, "charge");
        assert!(err.reason.contains("refused"));
    }

    #[tokio::test]
    async fn placeholders_do_not_clobber_custom_handlers() {
        let mut registry = ActionRegistry::new();
        registry.register("create_lead", Fixed(ActionOutcome::message("lead created").into()));
        for name in PLACEHOLDER_ACTIONS {
            registry.ensure_placeholder(name);
        }
        let mut context = context();

        let custom =
            registry.execute("create_lead", &mut context, &Map::new()).await.expect("custom");
        assert_eq!(custom, StepOutcome::Completed(ActionOutcome::message("lead created")));

        let placeholder = registry
            .execute("generate_payment_link", &mut context, &Map::new())
            .await
            .expect("placeholder");
        assert_eq!(
            placeholder,
            StepOutcome::NotImplemented { action: "generate_payment_link".to_string() }
        );
        assert_eq!(registry.len(), PLACEHOLDER_ACTIONS.len());
    }

    #[test]
    fn default_registry_wires_builtins_and_placeholders() {
        let mut registry = ActionRegistry::with_default_actions();
        for name in [
            "noop",
            "log_event",
            "store_context",
            "send_message",
            "send_llm_response",
            "deliver_bonus",
            "send_materials",
            "offer_options",
            "schedule_consultation",
        ] {
            assert!(registry.contains(name), "{name} should be registered");
        }
        assert_eq!(registry.len(), 8 + PLACEHOLDER_ACTIONS.len());
        assert!(registry.unregister("noop"));
        assert!(!registry.contains("noop"));
        assert!(!registry.is_empty());
    }

    #[test]
    fn fold_keeps_last_text_and_merges_data() {
        let mut accumulated = ActionOutcome::message("first")
            .with_buttons(vec![Button::callback("A", "a")])
            .with_data("x", 1);
        accumulated.fold(ActionOutcome::message("").with_data("y", 2));
        accumulated.fold(ActionOutcome::message("second").with_data("x", 3));

        assert_eq!(accumulated.message_text.as_deref(), Some("second"));
        assert_eq!(accumulated.buttons, vec![Button::callback("A", "a")]);
        assert_eq!(Value::Object(accumulated.data), json!({"x": 3, "y": 2}));
    }
}
