//! Rule-based dialogue scenes used when no scenario graph is loaded.
//!
//! Each [`SceneKind`] maps to one [`ScenePolicy`]. A policy only decides:
//! it rewrites the model's suggested next action, adds the scene's closing
//! tone, and may hand the user to another scene. The per-message pipeline
//! around it lives in [`runner`].

pub mod investor;
pub mod newbie;
pub mod runner;
pub mod skeptic;
pub mod strategy;
pub mod trader;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::session::SceneState;
use scenebot_core::domain::user::{Segment, User};

use crate::escalation::EscalationPolicy;
use crate::llm::LlmResponse;

pub use investor::InvestorScene;
pub use newbie::NewbieScene;
pub use runner::SceneRunner;
pub use skeptic::SkepticScene;
pub use strategy::StrategyScene;
pub use trader::TraderScene;

/// Scene-specific instructions appended to the model context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenePrompt {
    pub system_addition: String,
    pub tone: String,
    pub keywords: Vec<String>,
}

pub trait ScenePolicy: Send + Sync {
    fn kind(&self) -> SceneKind;

    fn escalation(&self) -> &EscalationPolicy;

    fn apply_policy(&self, user: &User, response: &mut LlmResponse, state: &SceneState);

    fn next_scene(
        &self,
        user: &User,
        response: &LlmResponse,
        state: &SceneState,
    ) -> Option<SceneKind>;

    fn prompt(&self) -> ScenePrompt;
}

/// Appends a closing line when the reply carries none of `markers`. The line
/// rotates with the attempt count.
pub(crate) fn append_tone(reply: &mut String, markers: &[&str], endings: &[&str], attempts: u32) {
    let lowered = reply.to_lowercase();
    if endings.is_empty() || markers.iter().any(|marker| lowered.contains(marker)) {
        return;
    }
    let index = usize::try_from(attempts).unwrap_or(0) % endings.len();
    reply.push_str(endings[index]);
}

pub(crate) fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| word.to_string()).collect()
}

struct SceneRule {
    segment: Option<Segment>,
    min_score: i32,
    max_score: i32,
    scene: SceneKind,
}

/// First match wins. A rule without a segment applies to every user.
const SCENE_RULES: [SceneRule; 4] = [
    SceneRule {
        segment: Some(Segment::Cold),
        min_score: i32::MIN,
        max_score: 4,
        scene: SceneKind::Newbie,
    },
    SceneRule { segment: Some(Segment::Warm), min_score: 5, max_score: 9, scene: SceneKind::Trader },
    SceneRule {
        segment: Some(Segment::Hot),
        min_score: 10,
        max_score: i32::MAX,
        scene: SceneKind::Investor,
    },
    SceneRule { segment: None, min_score: 14, max_score: i32::MAX, scene: SceneKind::Skeptic },
];

/// Scene for the next message. Strategy sticks once selected; users who
/// match no rule start in strategy while fresh and in newbie afterwards.
pub fn select_scene(user: &User, current: Option<SceneKind>) -> SceneKind {
    if current == Some(SceneKind::Strategy) {
        return SceneKind::Strategy;
    }

    let matched = SCENE_RULES.iter().find(|rule| {
        let segment_matches = rule.segment.is_none() || rule.segment == user.segment;
        segment_matches && (rule.min_score..=rule.max_score).contains(&user.lead_score)
    });
    if let Some(rule) = matched {
        return rule.scene;
    }

    if user.funnel_stage.is_fresh() {
        SceneKind::Strategy
    } else {
        SceneKind::Newbie
    }
}

#[derive(Default)]
pub struct SceneRegistry {
    scenes: HashMap<SceneKind, Arc<dyn ScenePolicy>>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_scenes() -> Self {
        let mut registry = Self::new();
        registry.register(NewbieScene::default());
        registry.register(TraderScene::default());
        registry.register(InvestorScene::default());
        registry.register(SkepticScene::default());
        registry.register(StrategyScene::default());
        registry
    }

    pub fn register<P>(&mut self, policy: P)
    where
        P: ScenePolicy + 'static,
    {
        self.scenes.insert(policy.kind(), Arc::new(policy));
    }

    pub fn get(&self, kind: SceneKind) -> Option<Arc<dyn ScenePolicy>> {
        self.scenes.get(&kind).cloned()
    }

    /// The policy for `kind`, or the newbie policy when `kind` is missing.
    pub fn resolve(&self, kind: SceneKind) -> Option<Arc<dyn ScenePolicy>> {
        self.get(kind).or_else(|| {
            warn!(
                event_name = "scene.missing_policy",
                scene = %kind,
                "scene not registered, using newbie"
            );
            self.get(SceneKind::Newbie)
        })
    }

    pub fn contains(&self, kind: SceneKind) -> bool {
        self.scenes.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}
