//! Case journeys built on the interaction layer.
//!
//! Each scenario is a linear sequence of steps over a shared [`Journey`].
//! Soft failures become failed sub-validations and the scenario carries
//! on; only errors returned with `?` end it early.

pub mod create;
pub mod delete;
pub mod edit;
pub mod navigate;
pub mod resolve;

use crate::config::{Config, ScenarioKind};
use crate::driver::Driver;
use crate::fixtures::FixtureStore;
use crate::interact::{InteractionExecutor, Outcome, PostCondition};
use crate::obstruction::ObstructionHandler;
use crate::random::Randomness;
use crate::resolve::ElementResolver;
use crate::targets::Field;
use crate::validate::{OutcomeValidator, Verdict};
use crate::Error;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything a scenario works with, for one browser context.
#[derive(Clone)]
pub struct Journey {
    pub driver: Arc<dyn Driver>,
    pub resolver: ElementResolver,
    pub executor: InteractionExecutor,
    pub obstructions: Arc<ObstructionHandler>,
    pub validator: OutcomeValidator,
    pub fixtures: FixtureStore,
    pub rng: Randomness,
    pub config: Arc<Config>,
}

impl Journey {
    pub fn new(driver: Arc<dyn Driver>, config: &Config) -> Self {
        let rng = Randomness::from_seed(config.data.seed);
        let resolver = ElementResolver::new(driver.clone(), rng.clone(), &config.timeouts);
        let executor = InteractionExecutor::new(
            resolver.clone(),
            rng.clone(),
            &config.timeouts,
            &config.interaction,
        );
        Self {
            obstructions: Arc::new(ObstructionHandler::new(&resolver)),
            validator: OutcomeValidator::new(&resolver, &config.timeouts, &config.policy),
            fixtures: FixtureStore::open(&config.fixtures.path),
            driver,
            resolver,
            executor,
            rng,
            config: Arc::new(config.clone()),
        }
    }

    /// Run one scenario to a result. Errors end up inside the result.
    pub async fn run(&self, kind: ScenarioKind) -> WorkflowResult {
        info!("Scenario {} started", kind);
        let mut rec = WorkflowRecorder::new(kind);
        let outcome = match kind {
            ScenarioKind::Create => create::run(self, &mut rec).await,
            ScenarioKind::Resolve => resolve::run(self, &mut rec).await,
            ScenarioKind::Edit => edit::run(self, &mut rec).await,
            ScenarioKind::Delete => delete::run(self, &mut rec).await,
        };
        let result = match outcome {
            Ok(()) => rec.finish(),
            Err(e) => rec.abort(&e),
        };
        if result.success() {
            info!("Scenario {} passed in {:?}", kind, result.duration());
        } else {
            warn!("Scenario {} failed: {}", kind, result.failure_summary());
        }
        result
    }

    /// Explicit obstruction sweep between steps.
    pub async fn clear(&self) {
        let events = self.obstructions.sweep_thorough().await;
        if !events.is_empty() {
            debug!("cleared {} obstruction(s)", events.len());
        }
    }

    /// Give the app time to finish a navigation or save.
    pub async fn settle(&self) {
        self.driver.pause(self.config.timeouts.settle_ms).await;
    }

    pub fn base(&self) -> &str {
        self.config.environment.base()
    }

    /// Value of the first visible match of `field`, waiting up to the
    /// widget budget for it to render.
    pub async fn read_field(&self, field: Field) -> Option<String> {
        let el = self
            .resolver
            .with_budget(self.config.timeouts.widget_ms)
            .resolve(&field.target())
            .await
            .ok()?
            .into_first()?;
        self.driver.value_of(el.selector()).await.ok().flatten()
    }

    /// After a save: surface and dismiss the form's error dialog, if any.
    ///
    /// Returns the error text when one was shown.
    pub async fn take_form_error(&self) -> Option<String> {
        let quick = self.resolver.with_budget(0);
        if !quick.is_visible(&Field::FormErrorOk.target()).await {
            return None;
        }
        let message = match quick.resolve(&Field::FormErrorMessage.target()).await {
            Ok(res) => res
                .first()
                .map(|el| el.label().to_string())
                .unwrap_or_default(),
            Err(_) => String::new(),
        };
        let message = if message.is_empty() {
            self.obstructions
                .protected_dialog()
                .await
                .unwrap_or_else(|| "error dialog shown".into())
        } else {
            message
        };
        warn!("Form error after save: {}", message);
        let dismissed = self
            .executor
            .click_target(
                &Field::FormErrorOk.target(),
                &PostCondition::Disappears(Field::FormErrorOk.target()),
            )
            .await;
        debug!("error dialog dismissal: {:?}", dismissed);
        Some(message)
    }
}

/// One named check inside a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubValidation {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Final, read-only record of one scenario run.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    scenario: ScenarioKind,
    success: bool,
    checks: Vec<SubValidation>,
    entity: Option<String>,
    case_number: Option<String>,
    error: Option<String>,
    retryable: bool,
    duration: Duration,
    attempts: u32,
}

impl WorkflowResult {
    /// Result for a scenario that never produced its own.
    pub fn failed(scenario: ScenarioKind, error: &Error, duration: Duration) -> Self {
        Self {
            scenario,
            success: false,
            checks: Vec::new(),
            entity: None,
            case_number: None,
            error: Some(error.to_string()),
            retryable: !error.is_structural(),
            duration,
            attempts: 1,
        }
    }

    pub fn scenario(&self) -> ScenarioKind {
        self.scenario
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn checks(&self) -> &[SubValidation] {
        &self.checks
    }

    /// Title of the case the scenario worked on.
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    pub fn case_number(&self) -> Option<&str> {
        self.case_number.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether another attempt could change the result.
    pub fn retryable(&self) -> bool {
        !self.success && self.retryable
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Runs it took to reach this result, retries included.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn after_attempts(mut self, attempts: u32, total: Duration) -> Self {
        self.attempts = attempts;
        self.duration = total;
        self
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &SubValidation> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Error or failed check names, for one-line reports.
    pub fn failure_summary(&self) -> String {
        if let Some(ref e) = self.error {
            return e.clone();
        }
        let failed: Vec<String> = self
            .failed_checks()
            .map(|c| format!("{} ({})", c.name, c.detail))
            .collect();
        if failed.is_empty() {
            "no checks recorded".into()
        } else {
            failed.join("; ")
        }
    }
}

/// Collects sub-validations while a scenario runs.
#[derive(Debug)]
pub struct WorkflowRecorder {
    scenario: ScenarioKind,
    started: Instant,
    checks: Vec<SubValidation>,
    entity: Option<String>,
    case_number: Option<String>,
}

impl WorkflowRecorder {
    pub fn new(scenario: ScenarioKind) -> Self {
        Self {
            scenario,
            started: Instant::now(),
            checks: Vec::new(),
            entity: None,
            case_number: None,
        }
    }

    pub fn entity(&mut self, title: &str) {
        self.entity = Some(title.to_string());
    }

    pub fn case_number(&mut self, number: &str) {
        self.case_number = Some(number.to_string());
    }

    pub fn check(&mut self, name: &str, passed: bool, detail: impl Into<String>) -> bool {
        let detail = detail.into();
        if passed {
            info!("  ✓ {}: {}", name, detail);
        } else {
            warn!("  ✗ {}: {}", name, detail);
        }
        self.checks.push(SubValidation {
            name: name.to_string(),
            passed,
            detail,
        });
        passed
    }

    pub fn pass(&mut self, name: &str, detail: impl Into<String>) {
        self.check(name, true, detail);
    }

    pub fn fail(&mut self, name: &str, detail: impl Into<String>) {
        self.check(name, false, detail);
    }

    pub fn outcome(&mut self, name: &str, outcome: &Outcome) -> bool {
        match outcome {
            Outcome::Success { strategy, attempts } => self.check(
                name,
                true,
                format!("{} after {} attempt(s)", strategy, attempts),
            ),
            Outcome::Failure { attempted } => {
                self.check(name, false, format!("tried {}", attempted.join(", ")))
            }
        }
    }

    pub fn verdict(&mut self, name: &str, verdict: &Verdict) -> bool {
        self.check(name, verdict.confirmed, verdict.summary())
    }

    /// Passes when at least one check ran and none failed.
    pub fn finish(self) -> WorkflowResult {
        let success = !self.checks.is_empty() && self.checks.iter().all(|c| c.passed);
        WorkflowResult {
            scenario: self.scenario,
            success,
            checks: self.checks,
            entity: self.entity,
            case_number: self.case_number,
            error: None,
            retryable: true,
            duration: self.started.elapsed(),
            attempts: 1,
        }
    }

    /// The scenario stopped early with `error`.
    pub fn abort(self, error: &Error) -> WorkflowResult {
        WorkflowResult {
            scenario: self.scenario,
            success: false,
            checks: self.checks,
            entity: self.entity,
            case_number: self.case_number,
            error: Some(error.to_string()),
            retryable: !error.is_structural(),
            duration: self.started.elapsed(),
            attempts: 1,
        }
    }
}
