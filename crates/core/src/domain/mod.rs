pub mod conversation;
pub mod response;
pub mod scene;
pub mod session;
pub mod user;

pub use conversation::{
    ConversationMessage, InteractionRecord, MessageRole, SceneStats, SceneTransitionRecord,
    SurveyAnswer,
};
pub use response::{Button, ButtonTarget, LogEvent, SceneResponse};
pub use scene::SceneKind;
pub use session::{SceneSession, SceneState, CONFIDENCE_HISTORY_LIMIT};
pub use user::{FunnelStage, Segment, User, UserId};
