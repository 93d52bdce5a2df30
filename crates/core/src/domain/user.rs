use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lead temperature assigned by the scoring pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Cold,
    Warm,
    Hot,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
            Self::Hot => "hot",
        }
    }
}

impl std::str::FromStr for Segment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cold" => Ok(Self::Cold),
            "warm" => Ok(Self::Warm),
            "hot" => Ok(Self::Hot),
            other => Err(format!("unsupported segment `{other}` (expected cold|warm|hot)")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    New,
    Welcomed,
    Surveyed,
    Engaged,
    Qualified,
    Consultation,
    Payment,
    Paid,
    Inactive,
}

impl FunnelStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Welcomed => "welcomed",
            Self::Surveyed => "surveyed",
            Self::Engaged => "engaged",
            Self::Qualified => "qualified",
            Self::Consultation => "consultation",
            Self::Payment => "payment",
            Self::Paid => "paid",
            Self::Inactive => "inactive",
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::New | Self::Welcomed)
    }
}

impl std::str::FromStr for FunnelStage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "welcomed" => Ok(Self::Welcomed),
            "surveyed" => Ok(Self::Surveyed),
            "engaged" => Ok(Self::Engaged),
            "qualified" => Ok(Self::Qualified),
            "consultation" => Ok(Self::Consultation),
            "payment" => Ok(Self::Payment),
            "paid" => Ok(Self::Paid),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unsupported funnel stage `{other}`")),
        }
    }
}

/// The slice of the lead profile the scenario engine reads. Segment and lead
/// score are computed elsewhere and arrive here as given inputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub segment: Option<Segment>,
    pub lead_score: i32,
    pub funnel_stage: FunnelStage,
}

impl User {
    pub fn new(id: i64) -> Self {
        Self { id: UserId(id), segment: None, lead_score: 0, funnel_stage: FunnelStage::New }
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segment = Some(segment);
        self
    }

    pub fn with_lead_score(mut self, lead_score: i32) -> Self {
        self.lead_score = lead_score;
        self
    }

    pub fn with_funnel_stage(mut self, funnel_stage: FunnelStage) -> Self {
        self.funnel_stage = funnel_stage;
        self
    }

    pub fn segment_label(&self) -> &'static str {
        self.segment.map(|segment| segment.as_str()).unwrap_or("cold")
    }
}
