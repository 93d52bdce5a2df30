use scenebot_core::domain::session::SceneState;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const LOW_CONFIDENCE_WINDOW: usize = 3;

pub const ESCALATION_KEYWORDS: [&str; 9] = [
    "didn't understand",
    "don't understand",
    "too complicated",
    "manager",
    "human",
    "operator",
    "not clear",
    "unclear",
    "help",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationReason {
    Keyword,
    LowConfidence,
    AttemptsExceeded,
    AlreadyEscalated,
}

impl EscalationReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::LowConfidence => "low_confidence",
            Self::AttemptsExceeded => "attempts_exceeded",
            Self::AlreadyEscalated => "already_escalated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EscalationDecision {
    Continue,
    Escalate { reason: EscalationReason, user_message: String },
}

impl EscalationDecision {
    pub fn should_escalate(&self) -> bool {
        matches!(self, Self::Escalate { .. })
    }
}

/// Per-scene thresholds for handing a conversation to a human.
#[derive(Clone, Debug, PartialEq)]
pub struct EscalationPolicy {
    pub confidence_threshold: f64,
    pub max_attempts: u32,
    pub keywords: Vec<String>,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::new(0.5, DEFAULT_MAX_ATTEMPTS)
    }
}

impl EscalationPolicy {
    pub fn new(confidence_threshold: f64, max_attempts: u32) -> Self {
        Self {
            confidence_threshold,
            max_attempts,
            keywords: ESCALATION_KEYWORDS.iter().map(|keyword| keyword.to_string()).collect(),
        }
    }

    /// Checks run in order: keyword, low-confidence streak, attempt budget,
    /// earlier escalation.
    pub fn evaluate(&self, message_text: &str, state: &SceneState) -> EscalationDecision {
        let lowered = message_text.to_lowercase();
        let reason = if self.keywords.iter().any(|keyword| lowered.contains(keyword.as_str())) {
            Some(EscalationReason::Keyword)
        } else if state
            .recent_confidences(LOW_CONFIDENCE_WINDOW)
            .is_some_and(|recent| recent.iter().all(|value| *value < self.confidence_threshold))
        {
            Some(EscalationReason::LowConfidence)
        } else if state.attempts_count > self.max_attempts {
            Some(EscalationReason::AttemptsExceeded)
        } else if state.escalation_triggered {
            Some(EscalationReason::AlreadyEscalated)
        } else {
            None
        };

        match reason {
            Some(reason) => EscalationDecision::Escalate {
                reason,
                user_message: handoff_message().to_string(),
            },
            None => EscalationDecision::Continue,
        }
    }

    pub fn should_escalate(&self, message_text: &str, state: &SceneState) -> bool {
        self.evaluate(message_text, state).should_escalate()
    }
}

pub fn handoff_message() -> &'static str {
    "👤 Got it, let me connect you with one of our experts. One moment please..."
}

#[cfg(test)]
mod tests {
    use scenebot_core::domain::session::SceneState;

    use super::{EscalationDecision, EscalationPolicy, EscalationReason};

    fn reason(decision: EscalationDecision) -> Option<&'static str> {
        match decision {
            EscalationDecision::Escalate { reason, .. } => Some(reason.reason_code()),
            EscalationDecision::Continue => None,
        }
    }

    #[test]
    fn three_low_confidences_escalate_without_keywords() {
        let policy = EscalationPolicy::new(0.5, 3);
        let mut state = SceneState::default();
        for confidence in [0.2, 0.3, 0.1] {
            state.record_confidence(confidence);
        }
        assert!(policy.should_escalate("tell me more about staking", &state));
        assert_eq!(reason(policy.evaluate("tell me more", &state)), Some("low_confidence"));
    }

    #[test]
    fn one_confident_turn_in_the_window_keeps_the_conversation() {
        let policy = EscalationPolicy::new(0.5, 3);
        let mut state = SceneState::default();
        for confidence in [0.2, 0.9, 0.1] {
            state.record_confidence(confidence);
        }
        assert_eq!(policy.evaluate("go on", &state), EscalationDecision::Continue);

        let mut short = SceneState::default();
        short.record_confidence(0.1);
        short.record_confidence(0.1);
        assert!(!policy.should_escalate("go on", &short), "needs a full window");
    }

    #[test]
    fn keyword_attempts_and_sticky_flag_each_escalate() {
        let policy = EscalationPolicy::new(0.5, 3);

        let fresh = SceneState::default();
        assert_eq!(reason(policy.evaluate("Can I talk to a MANAGER?", &fresh)), Some("keyword"));

        let mut tired = SceneState::default();
        tired.attempts_count = 4;
        assert_eq!(reason(policy.evaluate("ok", &tired)), Some("attempts_exceeded"));

        let mut flagged = SceneState::default();
        flagged.escalation_triggered = true;
        let decision = policy.evaluate("ok", &flagged);
        assert_eq!(reason(decision.clone()), Some("already_escalated"));
        match decision {
            EscalationDecision::Escalate { reason, user_message } => {
                assert_eq!(reason, EscalationReason::AlreadyEscalated);
                assert!(user_message.contains("experts"));
            }
            EscalationDecision::Continue => unreachable!("flagged state escalates"),
        }
    }
}
