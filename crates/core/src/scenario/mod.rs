pub mod loader;
pub mod model;
pub mod triggers;

pub use model::{
    EntryStep, GlobalConfig, GuardConfig, MetricConfig, ScenarioConfig, ScenarioConfigError,
    StateConfig, StateScope, Transition, DEFAULT_SCENARIO_CONFIG_PATH, START_STATE,
};
pub use triggers::{command_trigger, normalize_callback, resolve_callback_trigger};
