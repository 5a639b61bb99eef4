pub mod params;
pub mod schema;

pub use params::{Lookup, ParamDef, Params, ProcessEnv};
pub use schema::{
    BrowserConfig, Config, EditValidation, Environment, FixturesConfig, InteractionConfig,
    JourneyData, ObstructionConfig, OnFailure, Policy, RetryConfig, ScenarioKind, SessionConfig,
    Timeouts, Viewport,
};
