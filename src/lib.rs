//! # caseflow
//!
//! Resilient end-to-end case journeys for Dynamics 365 Customer Service.
//!
//! The crate scripts synthetic agent journeys (create, resolve, edit and
//! delete a case) against a live tenant. Each step locates its element through
//! an ordered list of candidate locators, acts on it through a chain of
//! interaction strategies, and confirms the effect from several independent
//! page signals, while a background sweep keeps dialogs, assistant popups and
//! stray tabs out of the way.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use caseflow::{Config, Runner};
//!
//! # #[tokio::main]
//! # async fn main() -> caseflow::Result<()> {
//! let config = Config::load("configs/dynamics.yaml")?;
//! let runner = Runner::launch(&config).await?;
//! for result in runner.run_all().await {
//!     println!("{}: {}", result.scenario(), result.success());
//! }
//! runner.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod fixtures;
pub mod interact;
pub mod obstruction;
pub mod random;
pub mod resolve;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod targets;
pub mod validate;

pub use config::{Config, ParamDef, Params, ScenarioKind};
pub use driver::{Driver, EokaDriver, Locator};
pub use fixtures::{CaseRecord, FixtureStore};
pub use random::Randomness;
pub use runner::Runner;
pub use scenario::{Journey, SubValidation, WorkflowResult};

/// Result type for caseflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during config loading or a journey.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    /// A required element had no valid, visible candidate.
    #[error("not found: {0}")]
    NotFound(String),

    /// Every strategy for an action was exhausted.
    #[error("{action} failed after trying: {}", attempted.join(", "))]
    InteractionFailed {
        action: String,
        attempted: Vec<String>,
    },

    #[error("validation inconclusive: {0}")]
    ValidationInconclusive(String),

    /// A mandatory precondition is missing; the scenario cannot continue.
    #[error("structural failure: {0}")]
    Structural(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Structural failures abort a scenario and are not worth retrying.
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Structural(_) | Error::Config(_))
    }
}
