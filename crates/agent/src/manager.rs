//! Entry point for inbound triggers and free-text messages.
//!
//! With a scenario graph loaded, triggers walk the graph: the first
//! transition matching the trigger picks the target state, whose entry steps
//! run through the [`ActionRegistry`]. Without a graph, free text goes to the
//! rule-based scenes.
//!
//! Sessions are read and written whole through the [`SessionStore`]. Two
//! concurrent triggers for one user both start from the same cached session
//! and the later write wins; there is no compare-and-swap.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use scenebot_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use scenebot_core::config::{AppConfig, SessionStoreKind};
use scenebot_core::domain::conversation::{SceneStats, SceneTransitionRecord};
use scenebot_core::domain::response::{Button, LogEvent, SceneResponse};
use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::session::SceneSession;
use scenebot_core::domain::user::User;
use scenebot_core::scenario::{ScenarioConfig, ScenarioConfigError, START_STATE};
use scenebot_db::{
    connect_with_config, migrations, ConversationRepository, InMemoryConversationRepository,
    InMemorySessionStore, RepositoryError, SessionStore, SqlConversationRepository,
    SqlSessionStore,
};

use crate::actions::{
    ActionContext, ActionExecutionError, ActionOutcome, ActionRegistry, ActionServices,
    StepOutcome,
};
use crate::llm::{LlmCapability, StaticLlm};
use crate::providers::{
    BonusProvider, FilePromptLoader, MaterialsProvider, NoPrompts, ProductCatalog, PromptLoader,
    StaticBonuses, StaticCatalog, StaticMaterials,
};
use crate::scenes::{select_scene, SceneRegistry, SceneRunner};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);
const SESSION_KEY_PREFIX: &str = "scene_session";
const AUDIT_ACTOR: &str = "scene-manager";

#[derive(Debug, Error)]
pub enum SceneError {
    #[error(transparent)]
    Action(#[from] ActionExecutionError),
    #[error("no scene policy registered for `{0}`")]
    MissingScene(SceneKind),
}

impl SceneError {
    /// User-safe reply; error details stay in the logs.
    pub fn fallback_response(&self) -> SceneResponse {
        placeholder_response()
    }
}

pub fn placeholder_response() -> SceneResponse {
    SceneResponse::text("Not ready to answer yet, but we are already working on this scenario.")
        .with_buttons(vec![manager_button()])
}

pub fn no_match_response() -> SceneResponse {
    SceneResponse::text("🤔 I haven't found a suitable answer yet. Try another option.")
}

pub fn error_response() -> SceneResponse {
    SceneResponse::text("😔 Something went wrong. Try again or contact a manager.")
        .with_buttons(vec![manager_button()])
        .escalated()
}

pub fn default_state_message(state: &str) -> String {
    format!("Step {state}: this feature is under construction.")
}

fn manager_button() -> Button {
    Button::callback("👤 Manager", "manager:request")
}

pub fn session_key(user: &User) -> String {
    format!("{SESSION_KEY_PREFIX}:{}", user.id)
}

/// Everything a [`SceneManager`] talks to.
#[derive(Clone)]
pub struct EngineDependencies {
    pub llm: Arc<dyn LlmCapability>,
    pub bonus: Arc<dyn BonusProvider>,
    pub materials: Arc<dyn MaterialsProvider>,
    pub products: Arc<dyn ProductCatalog>,
    pub prompts: Arc<dyn PromptLoader>,
    pub sessions: Arc<dyn SessionStore>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub audit: Arc<dyn AuditSink>,
}

impl EngineDependencies {
    /// Sample catalogs, a deterministic model and in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            llm: Arc::new(StaticLlm::default()),
            bonus: Arc::new(StaticBonuses::sample()),
            materials: Arc::new(StaticMaterials::sample()),
            products: Arc::new(StaticCatalog::sample()),
            prompts: Arc::new(NoPrompts),
            sessions: Arc::new(InMemorySessionStore::default()),
            conversations: Arc::new(InMemoryConversationRepository::default()),
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Sample catalogs plus the prompt directory and session backend named by
    /// `config`. The sqlite backend connects and applies pending migrations.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let base = Self {
            prompts: Arc::new(FilePromptLoader::new(config.scenario.prompts_dir.clone())),
            ..Self::in_memory()
        };
        let deps = match config.session.store {
            SessionStoreKind::Memory => base,
            SessionStoreKind::Sqlite => {
                let pool = connect_with_config(&config.database)
                    .await
                    .with_context(|| format!("connect to `{}`", config.database.url))?;
                migrations::run_pending(&pool).await.context("apply pending migrations")?;
                Self {
                    sessions: Arc::new(SqlSessionStore::new(pool.clone())),
                    conversations: Arc::new(SqlConversationRepository::new(pool)),
                    ..base
                }
            }
        };
        info!(
            event_name = "engine.stores_ready",
            session_store = config.session.store.as_str(),
            "engine dependencies ready"
        );
        Ok(deps)
    }
}

/// Scene usage over the last `period_days`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SceneAnalytics {
    pub period_days: u32,
    pub scenes: Vec<SceneStats>,
    /// Scenes registered on the manager, active or not.
    pub total_scenes: usize,
}

pub struct SceneManager {
    config_path: Option<PathBuf>,
    scenario: RwLock<Option<Arc<ScenarioConfig>>>,
    actions: ActionRegistry,
    services: Arc<ActionServices>,
    scenes: SceneRegistry,
    runner: SceneRunner,
    sessions: Arc<dyn SessionStore>,
    conversations: Arc<dyn ConversationRepository>,
    audit: Arc<dyn AuditSink>,
    session_ttl: Duration,
}

impl SceneManager {
    /// Loads the graph at `config_path`. A missing or invalid file leaves the
    /// graph disabled.
    pub fn new(config_path: impl Into<PathBuf>, deps: EngineDependencies) -> Self {
        let config_path = config_path.into();
        let scenario = load_scenario(&config_path);
        Self::build(Some(config_path), scenario, deps)
    }

    /// Uses an already-parsed graph (or none). `reload_config` keeps it.
    pub fn with_scenario(scenario: Option<ScenarioConfig>, deps: EngineDependencies) -> Self {
        Self::build(None, scenario.map(Arc::new), deps)
    }

    fn build(
        config_path: Option<PathBuf>,
        scenario: Option<Arc<ScenarioConfig>>,
        deps: EngineDependencies,
    ) -> Self {
        let services = Arc::new(ActionServices {
            llm: deps.llm.clone(),
            bonus: deps.bonus,
            materials: deps.materials.clone(),
            prompts: deps.prompts,
        });
        let runner = SceneRunner::new(
            deps.llm,
            deps.materials,
            deps.products,
            deps.conversations.clone(),
        );
        Self {
            config_path,
            scenario: RwLock::new(scenario),
            actions: ActionRegistry::with_default_actions(),
            services,
            scenes: SceneRegistry::with_default_scenes(),
            runner,
            sessions: deps.sessions,
            conversations: deps.conversations,
            audit: deps.audit,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_scenes(mut self, scenes: SceneRegistry) -> Self {
        self.scenes = scenes;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut ActionRegistry {
        &mut self.actions
    }

    pub fn scenes(&self) -> &SceneRegistry {
        &self.scenes
    }

    /// The graph in effect right now. Callers keep the snapshot for the
    /// whole request so a concurrent reload cannot change it mid-way.
    pub fn scenario(&self) -> Option<Arc<ScenarioConfig>> {
        match self.scenario.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn config_enabled(&self) -> bool {
        self.scenario().is_some()
    }

    pub fn default_state(&self) -> Option<String> {
        self.scenario().map(|scenario| scenario.default_state().to_string())
    }

    /// Re-reads the graph from disk and swaps it in. Returns whether a graph
    /// is active afterwards.
    pub fn reload_config(&self) -> bool {
        let Some(path) = &self.config_path else {
            return self.config_enabled();
        };
        let fresh = load_scenario(path);
        let enabled = fresh.is_some();
        match self.scenario.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        enabled
    }

    /// Session for `user`, or a fresh one on a cache miss.
    pub async fn session_for(&self, user: &User) -> SceneSession {
        let scenario = self.scenario();
        self.load_session(user, scenario.as_deref()).await
    }

    pub async fn process_trigger(
        &self,
        user: &User,
        trigger: &str,
        chat_id: Option<i64>,
        payload: Option<Map<String, Value>>,
    ) -> Result<SceneResponse, SceneError> {
        let Some(scenario) = self.scenario() else {
            warn!(
                event_name = "scenario.disabled",
                user_id = user.id.0,
                trigger,
                "no scenario graph loaded"
            );
            return Ok(placeholder_response());
        };

        let mut session = self.load_session(user, Some(&scenario)).await;
        let current = working_state(&session, &scenario);

        let state = match scenario.state(&current) {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    event_name = "scenario.unknown_current_state",
                    user_id = user.id.0,
                    state = %current,
                    trigger,
                    error = %err,
                    "current state is not declared"
                );
                return Ok(no_match_response());
            }
        };

        let Some(transition) = state.transition_for(trigger) else {
            info!(
                event_name = "scenario.no_transition",
                user_id = user.id.0,
                state = %current,
                trigger,
                "no transition for trigger"
            );
            return Ok(no_match_response());
        };

        let target = match scenario.state(&transition.target) {
            Ok(target) => target,
            Err(err) => {
                error!(
                    event_name = "scenario.unknown_target_state",
                    user_id = user.id.0,
                    state = %current,
                    target = %transition.target,
                    trigger,
                    error = %err,
                    "transition points at an undeclared state"
                );
                return Ok(placeholder_response());
            }
        };

        let audit_context = self.audit_context(user, chat_id);
        let mut extras = Map::new();
        extras.insert("trigger".to_string(), Value::from(trigger));
        extras.insert("payload".to_string(), Value::Object(payload.unwrap_or_default()));
        let mut context =
            ActionContext::new(user.clone(), chat_id, self.services.clone()).with_extras(extras);

        let mut accumulated = ActionOutcome::default();
        let mut not_implemented = Vec::new();
        for step in &target.entry_steps {
            match self.actions.execute(&step.action, &mut context, &step.params).await {
                Ok(StepOutcome::Completed(outcome)) => accumulated.fold(outcome),
                Ok(StepOutcome::Empty) => {}
                Ok(StepOutcome::NotImplemented { action }) => not_implemented.push(action),
                Err(err) => {
                    error!(
                        event_name = "scenario.entry_failed",
                        user_id = user.id.0,
                        state = %target.name,
                        trigger,
                        action = %err.action,
                        "entry step failed, session not advanced"
                    );
                    self.audit.emit(
                        AuditEvent::new(
                            &audit_context,
                            "scenario.entry_failed",
                            AuditCategory::Scenario,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("state", target.name.clone())
                        .with_metadata("action", err.action.clone()),
                    );
                    return Err(err.into());
                }
            }
        }

        let message_text = match accumulated.message_text.take().filter(|text| !text.is_empty()) {
            Some(text) => text,
            None if target.suppress_fallback() => String::new(),
            None => default_state_message(&target.name),
        };
        let log_event = accumulated
            .data
            .get("logged_event")
            .and_then(Value::as_str)
            .map(|event| LogEvent::state_entered(event, target.name.clone(), trigger));

        session.current_state = Some(target.name.clone());
        session.touch(Utc::now());
        self.save_session(user, &session).await;

        info!(
            event_name = "scenario.state_entered",
            user_id = user.id.0,
            from_state = %current,
            state = %target.name,
            trigger,
            placeholder_steps = not_implemented.len(),
            "state entered"
        );
        self.audit.emit(
            AuditEvent::new(
                &audit_context,
                "scenario.state_entered",
                AuditCategory::Scenario,
                AuditOutcome::Success,
            )
            .with_metadata("from_state", current.clone())
            .with_metadata("to_state", target.name.clone())
            .with_metadata("trigger", trigger)
            .with_metadata("not_implemented", not_implemented.join(",")),
        );

        Ok(SceneResponse {
            message_text,
            buttons: accumulated.buttons,
            escalate: false,
            log_event,
            next_scene: None,
        })
    }

    /// Free-text path through the rule-based scenes. Never fails: internal
    /// errors become an escalating error reply.
    pub async fn process_user_message(&self, user: &User, message_text: &str) -> SceneResponse {
        match self.try_process_user_message(user, message_text).await {
            Ok(response) => response,
            Err(err) => {
                error!(
                    event_name = "scene.message_failed",
                    user_id = user.id.0,
                    error = %err,
                    "user message processing failed"
                );
                error_response()
            }
        }
    }

    async fn try_process_user_message(
        &self,
        user: &User,
        message_text: &str,
    ) -> Result<SceneResponse, SceneError> {
        let scenario = self.scenario();
        let mut session = self.load_session(user, scenario.as_deref()).await;
        let audit_context = self.audit_context(user, None);

        let scene = select_scene(user, session.current_scene);
        if session.current_scene != Some(scene) {
            self.transition_scene(user, &mut session, scene, &audit_context).await;
        }

        let policy = self.scenes.resolve(scene).ok_or(SceneError::MissingScene(scene))?;
        let response = self
            .runner
            .process_message(policy.as_ref(), user, message_text, &mut session.scene_state)
            .await;

        if let Some(next) = response.next_scene {
            if self.scenes.contains(next) {
                self.transition_scene(user, &mut session, next, &audit_context).await;
            }
        }

        session.touch(Utc::now());
        self.save_session(user, &session).await;

        info!(
            event_name = "scene.message_processed",
            user_id = user.id.0,
            scene = ?session.current_scene,
            escalate = response.escalate,
            "user message processed"
        );
        Ok(response)
    }

    /// Admin override. Returns false for unknown or unregistered scenes.
    pub async fn force_scene_transition(&self, user: &User, scene_name: &str) -> bool {
        let Some(scene) = SceneKind::parse(scene_name).filter(|kind| self.scenes.contains(*kind))
        else {
            warn!(
                event_name = "scene.force_rejected",
                user_id = user.id.0,
                scene = scene_name,
                "unknown scene requested"
            );
            return false;
        };

        let scenario = self.scenario();
        let mut session = self.load_session(user, scenario.as_deref()).await;
        let audit_context = self.audit_context(user, None);
        self.transition_scene(user, &mut session, scene, &audit_context).await;
        session.touch(Utc::now());
        self.save_session(user, &session).await;
        true
    }

    /// Transition and interaction counts per scene since `days` ago.
    pub async fn scene_analytics(&self, days: u32) -> Result<SceneAnalytics, RepositoryError> {
        let since = Utc::now() - chrono::Duration::days(i64::from(days));
        let scenes = self.conversations.scene_stats(since).await?;
        Ok(SceneAnalytics { period_days: days, scenes, total_scenes: self.scenes.len() })
    }

    async fn transition_scene(
        &self,
        user: &User,
        session: &mut SceneSession,
        scene: SceneKind,
        audit_context: &AuditContext,
    ) {
        let from = session.current_scene.map(|kind| kind.as_str()).unwrap_or("none");
        info!(
            event_name = "scene.transition",
            user_id = user.id.0,
            from_scene = from,
            to_scene = %scene,
            segment = user.segment_label(),
            lead_score = user.lead_score,
            funnel_stage = user.funnel_stage.as_str(),
            "scene transition"
        );
        self.audit.emit(
            AuditEvent::new(
                audit_context,
                "scene.transition",
                AuditCategory::Scene,
                AuditOutcome::Success,
            )
            .with_metadata("from", from)
            .with_metadata("to", scene.as_str())
            .with_metadata("segment", user.segment_label())
            .with_metadata("lead_score", user.lead_score.to_string())
            .with_metadata("funnel_stage", user.funnel_stage.as_str()),
        );
        let record = SceneTransitionRecord {
            user_id: user.id,
            from_scene: session.current_scene,
            to_scene: scene,
            occurred_at: Utc::now(),
        };
        if let Err(err) = self.conversations.record_transition(record).await {
            warn!(
                event_name = "scene.transition_not_recorded",
                user_id = user.id.0,
                error = %err,
                "scene transition not recorded"
            );
        }
        session.enter_scene(scene);
    }

    async fn load_session(&self, user: &User, scenario: Option<&ScenarioConfig>) -> SceneSession {
        let key = session_key(user);
        match self.sessions.get(&key).await {
            Ok(Some(payload)) => match serde_json::from_str::<SceneSession>(&payload) {
                Ok(session) => return session,
                Err(err) => warn!(
                    event_name = "session.decode_failed",
                    user_id = user.id.0,
                    error = %err,
                    "cached session unreadable, starting fresh"
                ),
            },
            Ok(None) => {}
            Err(err) => warn!(
                event_name = "session.read_failed",
                user_id = user.id.0,
                error = %err,
                "session cache unavailable, starting fresh"
            ),
        }

        let state = scenario.map(|scenario| scenario.default_state().to_string());
        SceneSession::start(state, Utc::now())
    }

    async fn save_session(&self, user: &User, session: &SceneSession) {
        let payload = match serde_json::to_string(session) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    event_name = "session.encode_failed",
                    user_id = user.id.0,
                    error = %err,
                    "session not saved"
                );
                return;
            }
        };
        if let Err(err) = self.sessions.set(&session_key(user), payload, self.session_ttl).await {
            warn!(
                event_name = "session.write_failed",
                user_id = user.id.0,
                error = %err,
                "session not saved"
            );
        }
    }

    fn audit_context(&self, user: &User, chat_id: Option<i64>) -> AuditContext {
        AuditContext::new(Some(user.id), chat_id, Uuid::new_v4().to_string(), AUDIT_ACTOR)
    }
}

/// Current state, else the graph's entry state, else the legacy scene name,
/// else `START`.
fn working_state(session: &SceneSession, scenario: &ScenarioConfig) -> String {
    session
        .current_state
        .clone()
        .or_else(|| Some(scenario.default_state().to_string()).filter(|state| !state.is_empty()))
        .or_else(|| session.current_scene.map(|scene| scene.as_str().to_string()))
        .unwrap_or_else(|| START_STATE.to_string())
}

fn load_scenario(path: &Path) -> Option<Arc<ScenarioConfig>> {
    match ScenarioConfig::load(path) {
        Ok(scenario) => {
            info!(
                event_name = "scenario.loaded",
                path = %path.display(),
                version = scenario.version,
                states = scenario.states().len(),
                "scenario graph loaded"
            );
            Some(Arc::new(scenario))
        }
        Err(ScenarioConfigError::NotFound(missing)) => {
            warn!(
                event_name = "scenario.missing",
                path = %missing.display(),
                "scenario graph not found, using rule-based scenes"
            );
            None
        }
        Err(err) => {
            error!(
                event_name = "scenario.invalid",
                path = %path.display(),
                error = %err,
                "scenario graph rejected, using rule-based scenes"
            );
            None
        }
    }
}
