use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::session::SceneState;
use scenebot_core::domain::user::User;

use super::{append_tone, keywords, ScenePolicy, ScenePrompt};
use crate::escalation::EscalationPolicy;
use crate::llm::{LlmResponse, NextAction};

const SKEPTIC_MAX_ATTEMPTS: u32 = 5;

const MARKERS: [&str; 6] = ["fact", "evidence", "proof", "confirmed", "statistic", "real"];

const ENDINGS: [&str; 3] = [
    "\n\n📊 *Every claim we make is backed by facts and statistics.*",
    "\n\n🔍 *Checking matters, so here is something you can verify.*",
    "\n\n⚖️ *Your critical view is welcome. Let's weigh it objectively.*",
];

/// High scorers without trust: proof before any offer.
pub struct SkepticScene {
    escalation: EscalationPolicy,
}

impl Default for SkepticScene {
    fn default() -> Self {
        Self { escalation: EscalationPolicy::new(0.7, SKEPTIC_MAX_ATTEMPTS) }
    }
}

impl ScenePolicy for SkepticScene {
    fn kind(&self) -> SceneKind {
        SceneKind::Skeptic
    }

    fn escalation(&self) -> &EscalationPolicy {
        &self.escalation
    }

    fn apply_policy(&self, _user: &User, response: &mut LlmResponse, state: &SceneState) {
        if response.next_action == NextAction::OfferPayment {
            response.next_action = NextAction::ProvideProof;
        }
        if response.next_action == NextAction::OfferConsult && state.attempts_count < 3 {
            response.next_action = NextAction::AddressConcerns;
        }
        if response.next_action == NextAction::ShowMaterials {
            response.next_action = NextAction::ShowProof;
        }
        append_tone(&mut response.reply_text, &MARKERS, &ENDINGS, state.attempts_count);
    }

    /// A convinced skeptic returns to the scene matching their score.
    fn next_scene(
        &self,
        user: &User,
        response: &LlmResponse,
        state: &SceneState,
    ) -> Option<SceneKind> {
        let engaged =
            matches!(response.next_action, NextAction::OfferConsult | NextAction::ShowMaterials);
        if response.confidence > 0.8 && engaged && state.attempts_count > 3 {
            return Some(match user.lead_score {
                score if score > 10 => SceneKind::Investor,
                score if score > 5 => SceneKind::Trader,
                _ => SceneKind::Newbie,
            });
        }
        None
    }

    fn prompt(&self) -> ScenePrompt {
        ScenePrompt {
            system_addition: "SCENARIO: SKEPTIC\n\
                The user scores high but doubts what they hear.\n\
                Be honest and factual: answer objections with verifiable data, \
                never promise guaranteed returns, let the user reach conclusions.\n\
                Actions: provide_proof, address_concerns, show_proof."
                .to_string(),
            tone: "honest, factual, patient".to_string(),
            keywords: keywords(&["facts", "evidence", "transparency", "honestly", "real"]),
        }
    }
}
