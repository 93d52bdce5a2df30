use std::fmt;

use serde::{Deserialize, Serialize};

/// Rule-based dialogue scenes, one per audience segment plus the
/// strategy-selection entry scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneKind {
    Newbie,
    Trader,
    Investor,
    Skeptic,
    Strategy,
}

impl SceneKind {
    pub const ALL: [SceneKind; 5] =
        [Self::Newbie, Self::Trader, Self::Investor, Self::Skeptic, Self::Strategy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Newbie => "newbie",
            Self::Trader => "trader",
            Self::Investor => "investor",
            Self::Skeptic => "skeptic",
            Self::Strategy => "strategy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value.trim())
    }
}

impl fmt::Display for SceneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SceneKind;

    #[test]
    fn parse_round_trips_every_kind() {
        for kind in SceneKind::ALL {
            assert_eq!(SceneKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SceneKind::parse("wizard"), None);
    }
}
