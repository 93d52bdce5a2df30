use scenebot_core::domain::scene::SceneKind;
use scenebot_core::domain::session::SceneState;
use scenebot_core::domain::user::{Segment, User};

use super::{ScenePolicy, ScenePrompt};
use crate::escalation::{EscalationPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::llm::{LlmResponse, NextAction};

/// Entry scene: help the user choose between the reliability and growth
/// tracks, then hand over to the segment scene.
pub struct StrategyScene {
    escalation: EscalationPolicy,
}

impl Default for StrategyScene {
    fn default() -> Self {
        Self { escalation: EscalationPolicy::new(0.5, DEFAULT_MAX_ATTEMPTS) }
    }
}

impl ScenePolicy for StrategyScene {
    fn kind(&self) -> SceneKind {
        SceneKind::Strategy
    }

    fn escalation(&self) -> &EscalationPolicy {
        &self.escalation
    }

    fn apply_policy(&self, _user: &User, response: &mut LlmResponse, state: &SceneState) {
        if response.next_action == NextAction::OfferPayment {
            response.next_action = NextAction::AskPreferences;
        }
        if response.confidence < 0.6 {
            response.next_action = NextAction::GuideToSurvey;
        }
        if state.attempts_count > 2 && response.next_action == NextAction::Ask {
            response.next_action = NextAction::PushDecision;
        }
    }

    fn next_scene(
        &self,
        user: &User,
        response: &LlmResponse,
        _state: &SceneState,
    ) -> Option<SceneKind> {
        let chosen =
            matches!(response.next_action, NextAction::OfferConsult | NextAction::ShowMaterials);
        if let (Some(segment), true) = (user.segment, chosen) {
            return Some(match segment {
                Segment::Cold => SceneKind::Newbie,
                Segment::Warm => SceneKind::Trader,
                Segment::Hot => SceneKind::Investor,
            });
        }
        match user.lead_score {
            score if score <= 0 => None,
            score if score <= 5 => Some(SceneKind::Newbie),
            score if score <= 10 => Some(SceneKind::Trader),
            _ => Some(SceneKind::Investor),
        }
    }

    fn prompt(&self) -> ScenePrompt {
        ScenePrompt {
            system_addition: "SCENARIO: CHOOSING A STRATEGY\n\
                Help the user choose a crypto investing strategy.\n\
                Explain the difference between RELIABILITY (conservative, stability first) and \
                GROWTH (active trading, higher returns), help them make an informed choice and \
                encourage them to take the survey for an exact program match.\n\
                Actions: ask_preferences, guide_to_survey, push_decision, show_materials. \
                Do not offer paid services at this stage."
                .to_string(),
            tone: String::new(),
            keywords: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use scenebot_core::domain::scene::SceneKind;
    use scenebot_core::domain::session::SceneState;
    use scenebot_core::domain::user::{Segment, User};

    use super::StrategyScene;
    use crate::llm::{LlmResponse, NextAction};
    use crate::scenes::ScenePolicy;

    #[test]
    fn unsure_replies_guide_to_the_survey_without_tone_changes() {
        let scene = StrategyScene::default();
        let mut reply = LlmResponse::new("Pay today", NextAction::OfferPayment, 0.4);
        scene.apply_policy(&User::new(1), &mut reply, &SceneState::default());
        assert_eq!(reply.next_action, NextAction::GuideToSurvey);
        assert_eq!(reply.reply_text, "Pay today");

        let mut ask = LlmResponse::new("Which one?", NextAction::Ask, 0.9);
        let state = SceneState { attempts_count: 3, ..SceneState::default() };
        scene.apply_policy(&User::new(1), &mut ask, &state);
        assert_eq!(ask.next_action, NextAction::PushDecision);
    }

    #[test]
    fn chosen_strategy_hands_over_by_segment_then_score() {
        let scene = StrategyScene::default();
        let state = SceneState::default();
        let chose = LlmResponse::new("Great", NextAction::ShowMaterials, 0.9);
        let warm = User::new(1).with_segment(Segment::Warm);
        assert_eq!(scene.next_scene(&warm, &chose, &state), Some(SceneKind::Trader));

        let asking = LlmResponse::new("Tell me more", NextAction::Ask, 0.9);
        assert_eq!(scene.next_scene(&User::new(1), &asking, &state), None);
        let surveyed = User::new(1).with_lead_score(11);
        assert_eq!(scene.next_scene(&surveyed, &asking, &state), Some(SceneKind::Investor));
    }
}
