use crate::config::{Config, ProcessEnv, ScenarioKind};
use crate::driver::{Driver, EokaDriver};
use crate::obstruction::PollerGuard;
use crate::scenario::{Journey, WorkflowResult};
use crate::session::{Credentials, SessionOutcome, SessionStore};
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs configured scenarios in one browser session.
pub struct Runner {
    journey: Journey,
    browser: Option<Arc<EokaDriver>>,
    poller: Option<PollerGuard>,
}

impl Runner {
    /// Launch a browser, sign in and start the obstruction poller.
    pub async fn launch(config: &Config) -> Result<Self> {
        let browser = Arc::new(EokaDriver::launch(&config.browser).await?);
        let mut runner = Self::with_driver(browser.clone(), config);
        runner.browser = Some(browser);

        let credentials = Credentials::for_environment(&config.environment, &ProcessEnv)?;
        match runner.sign_in(&credentials).await? {
            SessionOutcome::Restored => debug!("Reusing saved session"),
            SessionOutcome::SignedIn => debug!("Fresh sign-in"),
        }

        if config.obstruction.enabled {
            runner.start_poller(config.obstruction.poll_interval_ms);
        }
        Ok(runner)
    }

    /// Wrap an existing driver. No sign-in, no background poller.
    pub fn with_driver(driver: Arc<dyn Driver>, config: &Config) -> Self {
        Self {
            journey: Journey::new(driver, config),
            browser: None,
            poller: None,
        }
    }

    pub fn journey(&self) -> &Journey {
        &self.journey
    }

    /// Restore the saved session or go through the sign-in pages.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<SessionOutcome> {
        let config = &self.journey.config;
        let store = SessionStore::new(&config.session.storage_state, &config.timeouts);
        store
            .ensure_logged_in(&self.journey.resolver, &self.journey.executor, credentials)
            .await
    }

    fn start_poller(&mut self, interval_ms: u64) {
        debug!("Obstruction poller every {}ms", interval_ms);
        let guard = self
            .journey
            .obstructions
            .spawn_poller(Duration::from_millis(interval_ms));
        self.poller = Some(guard);
    }

    /// Run every configured scenario, in order.
    pub async fn run_all(&self) -> Vec<WorkflowResult> {
        let mut results = Vec::with_capacity(self.journey.config.scenarios.len());
        for &kind in &self.journey.config.scenarios {
            results.push(self.run_scenario(kind).await);
        }
        results
    }

    /// Run one scenario with the configured timeout and retries.
    pub async fn run_scenario(&self, kind: ScenarioKind) -> WorkflowResult {
        let config = &self.journey.config;
        let retry = config.on_failure.as_ref().and_then(|f| f.retry.as_ref());
        let max_attempts = retry.map(|r| r.attempts).unwrap_or(1).max(1);
        let retry_delay = retry.map(|r| r.delay_ms).unwrap_or(0);
        let start = Instant::now();

        let mut attempt = 1;
        loop {
            let result = self.run_once(kind).await;
            if result.success() || !result.retryable() || attempt == max_attempts {
                if !result.success() {
                    self.handle_failure(kind).await;
                }
                return result.after_attempts(attempt, start.elapsed());
            }
            warn!(
                "Attempt {}/{} of {} failed: {}",
                attempt,
                max_attempts,
                kind,
                result.failure_summary()
            );
            attempt += 1;
            if retry_delay > 0 {
                tokio::time::sleep(Duration::from_millis(retry_delay)).await;
            }
            info!("Retry attempt {}/{}", attempt, max_attempts);
        }
    }

    async fn run_once(&self, kind: ScenarioKind) -> WorkflowResult {
        let limit = self.journey.config.timeouts.scenario_ms;
        let start = Instant::now();
        match tokio::time::timeout(Duration::from_millis(limit), self.journey.run(kind)).await {
            Ok(result) => result,
            Err(_) => {
                let error = Error::Timeout(format!("{} did not finish within {}ms", kind, limit));
                warn!("{}", error);
                WorkflowResult::failed(kind, &error, start.elapsed())
            }
        }
    }

    async fn handle_failure(&self, kind: ScenarioKind) {
        let Some(path) = self.screenshot_path(kind) else {
            return;
        };
        info!("Saving failure screenshot to: {}", path.display());
        let data = match self.journey.driver.screenshot().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to take screenshot: {}", e);
                return;
            }
        };
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("Failed to create {}: {}", dir.display(), e);
                return;
            }
        }
        if let Err(e) = std::fs::write(&path, data) {
            warn!("Failed to save screenshot: {}", e);
        }
    }

    fn screenshot_path(&self, kind: ScenarioKind) -> Option<PathBuf> {
        let template = self.journey.config.on_failure.as_ref()?.screenshot.as_ref()?;
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        Some(PathBuf::from(
            template
                .replace("{scenario}", kind.name())
                .replace("{timestamp}", &timestamp),
        ))
    }

    /// Stop the poller and close the browser.
    pub async fn close(self) -> Result<()> {
        let Runner {
            journey,
            browser,
            poller,
        } = self;
        if let Some(poller) = poller {
            poller.stop().await;
        }
        drop(journey);
        let Some(browser) = browser else {
            return Ok(());
        };
        match Arc::try_unwrap(browser) {
            Ok(browser) => browser.close().await,
            Err(_) => {
                warn!("Browser still in use, leaving it to shut down on drop");
                Ok(())
            }
        }
    }
}
