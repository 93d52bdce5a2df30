use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::session::SceneState;
use scenebot_core::domain::user::User;

use super::{append_tone, keywords, ScenePolicy, ScenePrompt};
use crate::escalation::{EscalationPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::llm::{LlmResponse, NextAction};

const MARKERS: [&str; 4] = ["strategy", "approach", "plan", "system"];

const ENDINGS: [&str; 3] = [
    "\n\n🎯 *Pick the strategy that matches your goals.*",
    "\n\n📈 *Let's look at concrete ways to get results.*",
    "\n\n💡 *Next step: a personal action plan.*",
];

/// Warm leads with some experience, ready for cases and consultations.
pub struct TraderScene {
    escalation: EscalationPolicy,
}

impl Default for TraderScene {
    fn default() -> Self {
        Self { escalation: EscalationPolicy::new(0.5, DEFAULT_MAX_ATTEMPTS) }
    }
}

impl ScenePolicy for TraderScene {
    fn kind(&self) -> SceneKind {
        SceneKind::Trader
    }

    fn escalation(&self) -> &EscalationPolicy {
        &self.escalation
    }

    fn apply_policy(&self, _user: &User, response: &mut LlmResponse, state: &SceneState) {
        if response.next_action == NextAction::Educate && state.attempts_count > 1 {
            response.next_action = NextAction::OfferConsult;
        }
        if response.next_action == NextAction::ShowMaterials {
            response.next_action = NextAction::ShowCases;
        }
        if response.confidence > 0.7 && response.next_action == NextAction::Ask {
            response.next_action = NextAction::ProvideStrategy;
        }
        append_tone(&mut response.reply_text, &MARKERS, &ENDINGS, state.attempts_count);
    }

    fn next_scene(
        &self,
        user: &User,
        response: &LlmResponse,
        state: &SceneState,
    ) -> Option<SceneKind> {
        let offering =
            matches!(response.next_action, NextAction::OfferConsult | NextAction::OfferPayment);
        if response.confidence > 0.8 && offering && user.lead_score > 8 {
            return Some(SceneKind::Investor);
        }
        if response.confidence < 0.3 && state.attempts_count > 2 {
            return Some(SceneKind::Newbie);
        }
        None
    }

    fn prompt(&self) -> ScenePrompt {
        ScenePrompt {
            system_addition: "SCENARIO: DEVELOPING TRADER\n\
                The user knows the basics (6-10 points) and is ready for a more serious approach.\n\
                Act as a strategy consultant: acknowledge their experience, propose the next level, \
                show real success cases and steer toward concrete actions.\n\
                Actions: provide_strategy, show_cases, offer_consult, escalate_to_expert."
                .to_string(),
            tone: "professional, motivating, strategic".to_string(),
            keywords: keywords(&["strategy", "growth", "opportunities", "results", "plan"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use scenebot_core::domain::scene::SceneKind;
    use scenebot_core::domain::session::SceneState;
    use scenebot_core::domain::user::User;

    use super::TraderScene;
    use crate::llm::{LlmResponse, NextAction};
    use crate::scenes::ScenePolicy;

    fn state(attempts: u32) -> SceneState {
        SceneState { attempts_count: attempts, ..SceneState::default() }
    }

    #[test]
    fn materials_become_cases_and_confident_questions_become_strategy() {
        let scene = TraderScene::default();
        let user = User::new(1);

        let mut materials = LlmResponse::new("See this", NextAction::ShowMaterials, 0.5);
        scene.apply_policy(&user, &mut materials, &state(0));
        assert_eq!(materials.next_action, NextAction::ShowCases);
        assert!(materials.reply_text.ends_with("*Pick the strategy that matches your goals.*"));

        let mut ask = LlmResponse::new("Which plan?", NextAction::Ask, 0.75);
        scene.apply_policy(&user, &mut ask, &state(0));
        assert_eq!(ask.next_action, NextAction::ProvideStrategy);
        assert_eq!(ask.reply_text, "Which plan?");

        let mut educate = LlmResponse::new("Lesson", NextAction::Educate, 0.5);
        scene.apply_policy(&user, &mut educate, &state(2));
        assert_eq!(educate.next_action, NextAction::OfferConsult);
    }

    #[test]
    fn scene_moves_up_for_hot_offers_and_down_for_lost_users() {
        let scene = TraderScene::default();
        let offer = LlmResponse::new("Pay", NextAction::OfferPayment, 0.9);
        assert_eq!(
            scene.next_scene(&User::new(1).with_lead_score(9), &offer, &state(1)),
            Some(SceneKind::Investor)
        );

        let lost = LlmResponse::new("Hmm", NextAction::Ask, 0.2);
        assert_eq!(scene.next_scene(&User::new(1), &lost, &state(3)), Some(SceneKind::Newbie));
        assert_eq!(scene.next_scene(&User::new(1), &lost, &state(1)), None);
    }
}
