//! Scene orchestration runtime for the sales assistant.
//!
//! Two paths turn an inbound event into a [`SceneResponse`]:
//!
//! 1. **Scenario graph** (`manager::SceneManager::process_trigger`): a trigger
//!    such as `command:/start` or `callback:survey:start` follows a transition
//!    of the YAML state graph, and the target state's entry steps run through
//!    the [`ActionRegistry`].
//! 2. **Rule-based scenes** (`manager::SceneManager::process_user_message`):
//!    free text is answered by the model, then shaped by the scene policy that
//!    matches the user's segment and lead score (`scenes`).
//!
//! # Safety Principle
//!
//! The model only drafts replies. Escalation, scene selection and state
//! transitions are deterministic decisions made here.
//!
//! [`SceneResponse`]: scenebot_core::SceneResponse

pub mod actions;
pub mod conversation;
pub mod escalation;
pub mod llm;
pub mod manager;
pub mod providers;
pub mod scenes;

pub use actions::{
    ActionContext, ActionExecutionError, ActionHandler, ActionOutcome, ActionRegistry,
    ActionServices, HandlerResult, StepOutcome,
};
pub use escalation::{EscalationDecision, EscalationPolicy, EscalationReason};
pub use llm::{LlmCapability, LlmContext, LlmResponse, NextAction, StaticLlm};
pub use manager::{EngineDependencies, SceneError, SceneManager};
pub use providers::{
    BonusProvider, FilePromptLoader, MaterialsProvider, NoPrompts, ProductCatalog, PromptLoader,
};
pub use scenes::{select_scene, ScenePolicy, ScenePrompt, SceneRegistry, SceneRunner};
