//! Acting on resolved elements with strategy chains.
//!
//! Every public operation returns an [`Outcome`] instead of failing: the
//! caller knows whether the field was mandatory.

mod options;

pub use options::{choose_option, is_sentinel_option, OptionChoice};

use crate::config::{InteractionConfig, Timeouts};
use crate::driver::{ClickMode, Driver};
use crate::random::Randomness;
use crate::resolve::{ElementResolver, Resolution, ResolvedElement, Target};
use crate::targets::Field;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One way of activating an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickStrategy {
    Mode(ClickMode),
    /// Focus the element, then press `key`.
    Keyboard(&'static str),
}

impl ClickStrategy {
    pub fn name(&self) -> String {
        match self {
            ClickStrategy::Mode(ClickMode::Offset { x, y }) => format!("offset({},{})", x, y),
            ClickStrategy::Mode(mode) => mode.name().to_string(),
            ClickStrategy::Keyboard(key) => format!("focus+{}", key),
        }
    }
}

/// Plain buttons and links.
pub const BUTTON_CHAIN: &[ClickStrategy] = &[
    ClickStrategy::Mode(ClickMode::Standard),
    ClickStrategy::Mode(ClickMode::Forced),
    ClickStrategy::Mode(ClickMode::Scripted),
];

/// Dropdowns and option-set fields.
pub const DROPDOWN_CHAIN: &[ClickStrategy] = &[
    ClickStrategy::Mode(ClickMode::Standard),
    ClickStrategy::Mode(ClickMode::Forced),
    ClickStrategy::Mode(ClickMode::Double),
    ClickStrategy::Keyboard("ArrowDown"),
    ClickStrategy::Mode(ClickMode::Offset { x: 10, y: 10 }),
    ClickStrategy::Keyboard("Space"),
];

/// Lookup search icons.
pub const LOOKUP_CHAIN: &[ClickStrategy] = &[
    ClickStrategy::Mode(ClickMode::Standard),
    ClickStrategy::Mode(ClickMode::Forced),
    ClickStrategy::Mode(ClickMode::Offset { x: 5, y: 5 }),
    ClickStrategy::Mode(ClickMode::Scripted),
    ClickStrategy::Mode(ClickMode::Dispatched),
];

/// What must be true after a strategy for it to count.
#[derive(Debug, Clone)]
pub enum PostCondition {
    /// The driver call succeeding is enough.
    None,
    Appears(Target),
    Disappears(Target),
}

/// How text gets into a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// Replace the value wholesale.
    Fill,
    /// Clear, focus, then type one character at a time.
    Type { delay_ms: u64 },
}

impl EntryMode {
    fn name(&self) -> &'static str {
        match self {
            EntryMode::Fill => "fill",
            EntryMode::Type { .. } => "type",
        }
    }
}

/// How the re-read value is compared with the intended one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMatch {
    Exact,
    Contains,
}

impl ValueMatch {
    pub fn check(&self, actual: &str, intended: &str) -> bool {
        match self {
            ValueMatch::Exact => actual.trim() == intended.trim(),
            ValueMatch::Contains => actual.contains(intended.trim()),
        }
    }
}

/// Result of an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { strategy: String, attempts: usize },
    Failure { attempted: Vec<String> },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// For mandatory fields: failure becomes [`Error::InteractionFailed`].
    pub fn into_result(self, action: &str) -> Result<String> {
        match self {
            Outcome::Success { strategy, .. } => Ok(strategy),
            Outcome::Failure { attempted } => Err(Error::InteractionFailed {
                action: action.to_string(),
                attempted,
            }),
        }
    }
}

/// Result of picking from a list.
#[derive(Debug, Clone)]
pub struct SelectOutcome {
    /// Text of the option clicked, if any.
    pub chosen: Option<String>,
    /// Texts of every option rendered.
    pub seen: Vec<String>,
    pub outcome: Outcome,
}

impl SelectOutcome {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success() && self.chosen.is_some()
    }
}

/// Applies actions to resolved elements.
#[derive(Clone)]
pub struct InteractionExecutor {
    driver: Arc<dyn Driver>,
    resolver: ElementResolver,
    rng: Randomness,
    widget_ms: u64,
    poll_ms: u64,
    entry_attempts: u32,
    type_delay_ms: u64,
}

impl InteractionExecutor {
    pub fn new(
        resolver: ElementResolver,
        rng: Randomness,
        timeouts: &Timeouts,
        interaction: &InteractionConfig,
    ) -> Self {
        Self {
            driver: resolver.driver().clone(),
            resolver,
            rng,
            widget_ms: timeouts.widget_ms,
            poll_ms: timeouts.poll_ms.max(1),
            entry_attempts: interaction.entry_attempts.max(1),
            type_delay_ms: interaction.type_delay_ms,
        }
    }

    /// Character-by-character entry with the configured delay.
    pub fn typed(&self) -> EntryMode {
        EntryMode::Type {
            delay_ms: self.type_delay_ms,
        }
    }

    // =========================================================================
    // Clicks
    // =========================================================================

    /// Walk `strategies` until one satisfies `post`.
    pub async fn click(
        &self,
        element: &ResolvedElement,
        strategies: &[ClickStrategy],
        post: &PostCondition,
    ) -> Outcome {
        let selector = element.selector();
        let mut attempted = Vec::new();

        for strategy in strategies {
            let name = strategy.name();
            attempted.push(name.clone());

            let delivered = match strategy {
                ClickStrategy::Mode(mode) => self.driver.click(selector, *mode).await,
                ClickStrategy::Keyboard(key) => match self.driver.focus(selector).await {
                    Ok(()) => self.driver.press_key(key).await,
                    Err(e) => Err(e),
                },
            };
            if let Err(e) = delivered {
                debug!("{}: {} failed: {}", element.target, name, e);
                continue;
            }

            if self.post_condition_met(post).await {
                debug!("{}: {} succeeded", element.target, name);
                return Outcome::Success {
                    strategy: name,
                    attempts: attempted.len(),
                };
            }
            debug!("{}: {} had no visible effect", element.target, name);
        }

        warn!(
            "{}: all click strategies failed ({})",
            element.target,
            attempted.join(", ")
        );
        Outcome::Failure { attempted }
    }

    /// Resolve `target` and click it with the button chain.
    pub async fn click_target(&self, target: &Target, post: &PostCondition) -> Outcome {
        match self.resolver.resolve(target).await {
            Ok(Resolution::Found(found)) => match found.first() {
                Some(el) => self.click(el, BUTTON_CHAIN, post).await,
                None => Outcome::Failure { attempted: vec![] },
            },
            Ok(Resolution::NotFound { target, tried }) => {
                debug!("{}: nothing to click ({} candidates)", target, tried);
                Outcome::Failure {
                    attempted: vec!["resolve".into()],
                }
            }
            Err(e) => {
                warn!("{}: {}", target.name(), e);
                Outcome::Failure {
                    attempted: vec!["resolve".into()],
                }
            }
        }
    }

    /// Open a dropdown and wait for `expect` to render.
    pub async fn open_widget(&self, element: &ResolvedElement, expect: &Target) -> Outcome {
        self.click(element, DROPDOWN_CHAIN, &PostCondition::Appears(expect.clone()))
            .await
    }

    /// Open a lookup from its search icon and wait for `expect`.
    pub async fn open_lookup(&self, element: &ResolvedElement, expect: &Target) -> Outcome {
        self.click(element, LOOKUP_CHAIN, &PostCondition::Appears(expect.clone()))
            .await
    }

    async fn post_condition_met(&self, post: &PostCondition) -> bool {
        match post {
            PostCondition::None => true,
            PostCondition::Appears(target) => {
                self.resolver
                    .with_budget(self.widget_ms)
                    .is_visible(target)
                    .await
            }
            PostCondition::Disappears(target) => {
                let quick = self.resolver.with_budget(0);
                let deadline = Instant::now() + Duration::from_millis(self.widget_ms);
                loop {
                    if !quick.is_visible(target).await {
                        return true;
                    }
                    if Instant::now() >= deadline {
                        return false;
                    }
                    self.driver.pause(self.poll_ms).await;
                }
            }
        }
    }

    // =========================================================================
    // Text entry
    // =========================================================================

    /// Enter `value`, re-read the field, and retry up to the attempt cap.
    ///
    /// Each attempt walks `modes` in order and stops once the re-read value
    /// matches.
    pub async fn enter_text(
        &self,
        element: &ResolvedElement,
        value: &str,
        modes: &[EntryMode],
        matching: ValueMatch,
    ) -> Outcome {
        let selector = element.selector();
        let mut attempted = Vec::new();

        for attempt in 1..=self.entry_attempts {
            for mode in modes {
                attempted.push(format!("{}#{}", mode.name(), attempt));
                if let Err(e) = self.apply_entry(selector, value, *mode).await {
                    debug!("{}: {} failed: {}", element.target, mode.name(), e);
                    continue;
                }
                let actual = self
                    .driver
                    .value_of(selector)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                if matching.check(&actual, value) {
                    info!("{} = '{}' ({})", element.target, value, mode.name());
                    return Outcome::Success {
                        strategy: mode.name().to_string(),
                        attempts: attempted.len(),
                    };
                }
                debug!(
                    "{}: {} left '{}', wanted '{}'",
                    element.target,
                    mode.name(),
                    actual,
                    value
                );
            }
        }

        warn!("{}: could not enter '{}'", element.target, value);
        Outcome::Failure { attempted }
    }

    async fn apply_entry(&self, selector: &str, value: &str, mode: EntryMode) -> Result<()> {
        match mode {
            EntryMode::Fill => self.driver.fill(selector, value).await,
            EntryMode::Type { delay_ms } => {
                self.driver.fill(selector, "").await?;
                self.driver.focus(selector).await?;
                for ch in value.chars() {
                    self.driver.type_text(ch.encode_utf8(&mut [0; 4])).await?;
                    if delay_ms > 0 {
                        self.driver.pause(delay_ms).await;
                    }
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Option lists
    // =========================================================================

    /// Pick an option from the currently rendered list.
    pub async fn select_option(&self, list: &Target, choice: &OptionChoice) -> SelectOutcome {
        let options = match self.resolver.with_budget(self.widget_ms).resolve(list).await {
            Ok(res) => res.into_all(),
            Err(e) => {
                warn!("{}: {}", list.name(), e);
                Vec::new()
            }
        };
        let seen: Vec<String> = options.iter().map(|o| o.label().to_string()).collect();

        let Some(index) = choose_option(&seen, choice, &self.rng) else {
            warn!("{}: no acceptable option among {:?}", list.name(), seen);
            return SelectOutcome {
                chosen: None,
                seen,
                outcome: Outcome::Failure {
                    attempted: vec!["choose".into()],
                },
            };
        };

        let option = &options[index];
        let outcome = self.click(option, BUTTON_CHAIN, &PostCondition::None).await;
        if outcome.is_success() {
            info!("{}: selected '{}'", list.name(), option.label());
        }
        SelectOutcome {
            chosen: outcome.is_success().then(|| option.label().to_string()),
            seen,
            outcome,
        }
    }

    /// Open `field` and pick from the list it renders.
    pub async fn choose_in_dropdown(&self, field: &ResolvedElement, choice: &OptionChoice) -> SelectOutcome {
        let list = Field::OpenListOptions.target();
        let opened = self.open_widget(field, &list).await;
        if let Outcome::Failure { attempted } = opened {
            return SelectOutcome {
                chosen: None,
                seen: Vec::new(),
                outcome: Outcome::Failure { attempted },
            };
        }
        self.select_option(&list, choice).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{FakeDriver, FakeElement};
    use crate::resolve::SelectionPolicy;

    fn executor(driver: &FakeDriver) -> InteractionExecutor {
        let timeouts = Timeouts {
            candidate_ms: 0,
            widget_ms: 5,
            poll_ms: 1,
            ..Timeouts::default()
        };
        let rng = Randomness::seeded(3);
        let resolver = ElementResolver::new(Arc::new(driver.clone()), rng.clone(), &timeouts);
        let interaction = InteractionConfig {
            entry_attempts: 3,
            type_delay_ms: 0,
        };
        InteractionExecutor::new(resolver, rng, &timeouts, &interaction)
    }

    async fn resolve(driver: &FakeDriver, target: &Target) -> ResolvedElement {
        executor(driver)
            .resolver
            .resolve(target)
            .await
            .unwrap()
            .into_first()
            .unwrap()
    }

    fn listbox() -> Target {
        Target::new("listbox")
            .or_many(r#"[role="option"]"#)
            .select(SelectionPolicy::All)
    }

    #[tokio::test]
    async fn dropdown_chain_falls_through_to_working_strategy() {
        let driver = FakeDriver::new();
        driver.add(
            FakeElement::new("#origin")
                .tag("button")
                .inert(&["standard", "forced", "double"]),
        );
        driver.add(FakeElement::new("#opt").matching(r#"[role="option"]"#).hidden());
        driver.on_key("ArrowDown", |p| p.set_visible("#opt", true));

        let origin = resolve(&driver, &Target::new("Origin").or("#origin")).await;
        let outcome = executor(&driver).open_widget(&origin, &listbox()).await;
        assert_eq!(
            outcome,
            Outcome::Success {
                strategy: "focus+ArrowDown".into(),
                attempts: 4
            }
        );
    }

    #[tokio::test]
    async fn click_reports_every_strategy_on_failure() {
        let driver = FakeDriver::new();
        driver.add(FakeElement::new("#dead").tag("button"));
        let el = resolve(&driver, &Target::new("Dead").or("#dead")).await;
        let outcome = executor(&driver)
            .click(&el, LOOKUP_CHAIN, &PostCondition::Appears(listbox()))
            .await;
        assert_eq!(
            outcome,
            Outcome::Failure {
                attempted: vec![
                    "standard".into(),
                    "forced".into(),
                    "offset(5,5)".into(),
                    "scripted".into(),
                    "dispatched".into()
                ]
            }
        );
        assert!(outcome.into_result("open lookup").is_err());
    }

    #[tokio::test]
    async fn disappears_post_condition() {
        let driver = FakeDriver::new();
        driver.add(FakeElement::new("#close").tag("button"));
        driver.add(FakeElement::new("#popup"));
        driver.on_click("#close", |p| p.remove("#popup"));
        let el = resolve(&driver, &Target::new("Close").or("#close")).await;
        let outcome = executor(&driver)
            .click(
                &el,
                BUTTON_CHAIN,
                &PostCondition::Disappears(Target::new("Popup").or("#popup")),
            )
            .await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn enter_text_falls_back_to_typing() {
        let driver = FakeDriver::new();
        driver.add(FakeElement::new("#title").tag("input").fill_ignored());
        let el = resolve(&driver, &Target::new("Title").or("#title")).await;
        let exec = executor(&driver);
        let outcome = exec
            .enter_text(&el, "AutoCase_ABCDEF", &[EntryMode::Fill, exec.typed()], ValueMatch::Exact)
            .await;
        assert_eq!(
            outcome,
            Outcome::Success {
                strategy: "type".into(),
                attempts: 2
            }
        );
        assert_eq!(driver.value("#title").as_deref(), Some("AutoCase_ABCDEF"));
        assert_eq!(driver.count("type:"), "AutoCase_ABCDEF".len());
    }

    #[tokio::test]
    async fn enter_text_respects_attempt_cap() {
        let driver = FakeDriver::new();
        // Neither fill nor typing sticks: the element is a plain div.
        driver.add(FakeElement::new("#broken").tag("div").fill_ignored());
        let el = resolve(&driver, &Target::new("Broken").or("#broken")).await;
        let outcome = executor(&driver)
            .enter_text(&el, "x y", &[EntryMode::Fill], ValueMatch::Contains)
            .await;
        assert_eq!(
            outcome,
            Outcome::Failure {
                attempted: vec!["fill#1".into(), "fill#2".into(), "fill#3".into()]
            }
        );
    }

    #[tokio::test]
    async fn select_option_skips_sentinels() {
        let driver = FakeDriver::new();
        for (i, text) in ["--Select--", "", "Email", "Phone"].iter().enumerate() {
            driver.add(
                FakeElement::new(&format!("#o{}", i))
                    .text(text)
                    .matching(r#"[role="option"]"#),
            );
        }
        let exec = executor(&driver);
        for _ in 0..20 {
            let picked = exec
                .select_option(&listbox(), &OptionChoice::Random { among: None })
                .await;
            assert!(picked.is_success());
            let chosen = picked.chosen.unwrap();
            assert!(chosen == "Email" || chosen == "Phone");
        }
    }

    #[tokio::test]
    async fn select_option_without_alternative_fails_gracefully() {
        let driver = FakeDriver::new();
        driver.add(FakeElement::new("#o1").text("Email").matching(r#"[role="option"]"#));
        let picked = executor(&driver)
            .select_option(
                &listbox(),
                &OptionChoice::DifferentFrom {
                    current: "email".into(),
                    preferred: vec!["Email".into()],
                },
            )
            .await;
        assert!(!picked.is_success());
        assert_eq!(picked.chosen, None);
        assert_eq!(picked.seen, vec!["Email".to_string()]);
        assert_eq!(driver.count("click:"), 0);
    }
}
