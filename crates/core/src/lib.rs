pub mod audit;
pub mod config;
pub mod domain;
pub mod scenario;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::{
    Button, ButtonTarget, FunnelStage, LogEvent, SceneKind, SceneResponse, SceneSession,
    SceneState, Segment, User, UserId,
};
pub use scenario::{ScenarioConfig, ScenarioConfigError, StateConfig};
