use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::scene::SceneKind;

pub const CONFIDENCE_HISTORY_LIMIT: usize = 10;

/// Dialogue progress inside one legacy scene. Reset on every scene change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneState {
    pub current_step: String,
    pub attempts_count: u32,
    pub confidence_history: Vec<f64>,
    pub context_data: Map<String, Value>,
    pub last_action: String,
    pub escalation_triggered: bool,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            current_step: "initial".to_string(),
            attempts_count: 0,
            confidence_history: Vec::new(),
            context_data: Map::new(),
            last_action: "none".to_string(),
            escalation_triggered: false,
        }
    }
}

impl SceneState {
    pub fn record_confidence(&mut self, confidence: f64) {
        self.confidence_history.push(confidence);
        let overflow = self.confidence_history.len().saturating_sub(CONFIDENCE_HISTORY_LIMIT);
        if overflow > 0 {
            self.confidence_history.drain(..overflow);
        }
    }

    /// The last `count` confidences, or `None` when fewer were recorded.
    pub fn recent_confidences(&self, count: usize) -> Option<&[f64]> {
        let len = self.confidence_history.len();
        (len >= count).then(|| &self.confidence_history[len - count..])
    }
}

/// Per-user conversation position, cached with a TTL. A cache miss always
/// means a fresh session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneSession {
    #[serde(default)]
    pub current_scene: Option<SceneKind>,
    #[serde(default)]
    pub current_state: Option<String>,
    #[serde(default)]
    pub scene_state: SceneState,
    #[serde(default)]
    pub session_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_interaction: Option<DateTime<Utc>>,
}

impl SceneSession {
    /// Fresh session with no scene yet; the first message picks one.
    pub fn start(current_state: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            current_scene: None,
            current_state,
            scene_state: SceneState::default(),
            session_start: Some(now),
            last_interaction: Some(now),
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_interaction = Some(now);
        if self.session_start.is_none() {
            self.session_start = Some(now);
        }
    }

    pub fn enter_scene(&mut self, scene: SceneKind) {
        self.current_scene = Some(scene);
        self.scene_state = SceneState::default();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{SceneSession, SceneState, CONFIDENCE_HISTORY_LIMIT};
    use crate::domain::scene::SceneKind;

    #[test]
    fn confidence_history_keeps_the_most_recent_entries() {
        let mut state = SceneState::default();
        for step in 0..(CONFIDENCE_HISTORY_LIMIT + 3) {
            state.record_confidence(step as f64 / 100.0);
        }

        assert_eq!(state.confidence_history.len(), CONFIDENCE_HISTORY_LIMIT);
        assert_eq!(state.confidence_history.first().copied(), Some(0.03));
        assert_eq!(state.recent_confidences(3), Some(&[0.10, 0.11, 0.12][..]));
        assert_eq!(SceneState::default().recent_confidences(1), None);
    }

    #[test]
    fn session_round_trips_through_json() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid timestamp");
        let mut session = SceneSession::start(Some("HELLO".to_string()), now);
        session.enter_scene(SceneKind::Trader);
        session.scene_state.attempts_count = 2;
        session.scene_state.record_confidence(0.42);
        session.scene_state.last_action = "offer_consult".to_string();
        session.scene_state.current_step = "pitch".to_string();
        session.scene_state.escalation_triggered = true;
        session.scene_state.context_data.insert("topic".to_string(), json!("safety"));

        let encoded = serde_json::to_string(&session).expect("encode session");
        let decoded: SceneSession = serde_json::from_str(&encoded).expect("decode session");

        assert_eq!(decoded, session);
        assert_eq!(decoded.scene_state, session.scene_state);
    }

    #[test]
    fn entering_a_scene_resets_dialogue_state() {
        let now = Utc::now();
        let mut session = SceneSession::start(None, now);
        assert_eq!(session.current_scene, None);
        session.enter_scene(SceneKind::Newbie);
        session.scene_state.attempts_count = 4;

        session.enter_scene(SceneKind::Trader);

        assert_eq!(session.current_scene, Some(SceneKind::Trader));
        assert_eq!(session.scene_state, SceneState::default());
    }

    #[test]
    fn partial_payloads_fill_defaults() {
        let decoded: SceneSession =
            serde_json::from_str(r#"{"current_state":"START"}"#).expect("decode partial payload");
        assert_eq!(decoded.current_state.as_deref(), Some("START"));
        assert_eq!(decoded.current_scene, None);
        assert_eq!(decoded.scene_state.current_step, "initial");
    }
}
