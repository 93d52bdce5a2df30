use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::session::SceneState;
use scenebot_core::domain::user::User;

use super::{append_tone, keywords, ScenePolicy, ScenePrompt};
use crate::escalation::{EscalationPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::llm::{LlmResponse, NextAction};

const MARKERS: [&str; 5] = ["exclusive", "premium", "vip", "individual", "level"];

const ENDINGS: [&str; 3] = [
    "\n\n💎 *Exclusive VIP-level opportunities are open to you.*",
    "\n\n🏆 *Your experience lets us consider premium strategies.*",
    "\n\n⭐ *A personal approach is exactly what fits you now.*",
];

/// Hot leads: move quickly from consultation to payment.
pub struct InvestorScene {
    escalation: EscalationPolicy,
}

impl Default for InvestorScene {
    fn default() -> Self {
        Self { escalation: EscalationPolicy::new(0.6, DEFAULT_MAX_ATTEMPTS) }
    }
}

impl ScenePolicy for InvestorScene {
    fn kind(&self) -> SceneKind {
        SceneKind::Investor
    }

    fn escalation(&self) -> &EscalationPolicy {
        &self.escalation
    }

    fn apply_policy(&self, _user: &User, response: &mut LlmResponse, state: &SceneState) {
        if response.next_action == NextAction::Educate && state.attempts_count > 0 {
            response.next_action = NextAction::OfferConsult;
        }
        if response.next_action == NextAction::OfferConsult && state.attempts_count > 1 {
            response.next_action = NextAction::OfferPayment;
        }
        if response.next_action == NextAction::ShowMaterials {
            response.next_action = NextAction::ShowExclusive;
        }
        append_tone(&mut response.reply_text, &MARKERS, &ENDINGS, state.attempts_count);
    }

    fn next_scene(
        &self,
        user: &User,
        response: &LlmResponse,
        state: &SceneState,
    ) -> Option<SceneKind> {
        if response.confidence < 0.4 && state.attempts_count > 2 && user.lead_score > 12 {
            return Some(SceneKind::Skeptic);
        }
        if response.next_action == NextAction::Educate && state.attempts_count > 3 {
            return Some(SceneKind::Trader);
        }
        None
    }

    fn prompt(&self) -> ScenePrompt {
        ScenePrompt {
            system_addition: "SCENARIO: EXPERIENCED INVESTOR\n\
                The user is experienced (10+ points) and ready to invest.\n\
                Act as a premium advisor: be concise and confident, focus on exclusive \
                opportunities, ROI and an individual approach; move toward a concrete offer.\n\
                Actions: offer_consult, offer_payment, show_exclusive."
                .to_string(),
            tone: "professional, confident, premium".to_string(),
            keywords: keywords(&["exclusive", "premium", "VIP", "individual", "results", "ROI"]),
        }
    }
}
