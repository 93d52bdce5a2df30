use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::session::SceneState;
use scenebot_core::domain::user::User;

use super::{append_tone, keywords, ScenePolicy, ScenePrompt};
use crate::escalation::{EscalationPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::llm::{LlmResponse, NextAction};

const MARKERS: [&str; 4] = ["important", "understand", "learn", "basics"];

const ENDINGS: [&str; 3] = [
    "\n\n💡 *It's important to understand the basics before taking the first steps.*",
    "\n\n📚 *I recommend going through the basic principles first.*",
    "\n\n🎯 *Let's start simple and go deeper step by step.*",
];

/// Cold leads: education first, offers later.
pub struct NewbieScene {
    escalation: EscalationPolicy,
}

impl Default for NewbieScene {
    fn default() -> Self {
        Self { escalation: EscalationPolicy::new(0.4, DEFAULT_MAX_ATTEMPTS) }
    }
}

impl ScenePolicy for NewbieScene {
    fn kind(&self) -> SceneKind {
        SceneKind::Newbie
    }

    fn escalation(&self) -> &EscalationPolicy {
        &self.escalation
    }

    fn apply_policy(&self, _user: &User, response: &mut LlmResponse, state: &SceneState) {
        if response.next_action == NextAction::OfferPayment {
            response.next_action = NextAction::ShowMaterials;
        }
        if response.next_action == NextAction::OfferConsult && state.attempts_count < 3 {
            response.next_action = NextAction::Educate;
        }
        if response.next_action == NextAction::Ask && state.attempts_count > 2 {
            response.next_action = NextAction::ShowMaterials;
        }
        append_tone(&mut response.reply_text, &MARKERS, &ENDINGS, state.attempts_count);
    }

    fn next_scene(
        &self,
        user: &User,
        response: &LlmResponse,
        state: &SceneState,
    ) -> Option<SceneKind> {
        let ready = response.confidence > 0.8
            && response.next_action == NextAction::OfferConsult
            && state.attempts_count > 3;
        (ready && user.lead_score > 5).then_some(SceneKind::Trader)
    }

    fn prompt(&self) -> ScenePrompt {
        ScenePrompt {
            system_addition: "SCENARIO: CRYPTO NEWCOMER\n\
                The user is new to crypto (0-5 points) and needs patient teaching.\n\
                Act as a patient mentor: explain concepts in plain words, never rush decisions, \
                give practical advice. Safety comes first; teach step by step with examples.\n\
                Actions: educate, show_materials, ask, build_trust. \
                Do not propose complex strategies or quick wins."
                .to_string(),
            tone: "friendly, patient, educational".to_string(),
            keywords: keywords(&["basics", "safety", "step by step", "learning", "understanding"]),
        }
    }
}
