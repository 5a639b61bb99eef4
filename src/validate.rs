//! Confirming that a workflow step had its intended effect.
//!
//! No single page signal is reliable in the Customer Service app, so each
//! expected outcome is a prioritized list of checks. Each check is polled
//! for a bounded time and the whole walk has its own budget.

use crate::config::{Policy, Timeouts};
use crate::driver::Driver;
use crate::resolve::{ElementResolver, Target};
use crate::targets::{case_link, Field};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Empty-grid texts shown by list views and lookups.
pub const NO_RESULTS_MARKERS: &[&str] = &["No results", "No data", "No records", "No items to show"];

/// An observable page condition.
#[derive(Debug, Clone)]
pub enum Signal {
    Visible(Target),
    Absent(Target),
    /// Case-insensitive substring of the visible page text.
    TextPresent(String),
    ValueEquals { target: Target, value: String },
    ValueNonEmpty(Target),
    UrlContains(String),
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Visible(t) => write!(f, "visible({})", t.name()),
            Signal::Absent(t) => write!(f, "absent({})", t.name()),
            Signal::TextPresent(s) => write!(f, "text({})", s),
            Signal::ValueEquals { target, value } => write!(f, "{} == '{}'", target.name(), value),
            Signal::ValueNonEmpty(t) => write!(f, "{} non-empty", t.name()),
            Signal::UrlContains(s) => write!(f, "url ~ {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    /// Firing confirms the outcome.
    Positive,
    /// Firing refutes the outcome.
    Negative,
    /// Confirms only when weak signals are accepted and nothing refuted.
    Weak,
}

#[derive(Debug, Clone)]
pub struct Check {
    pub signal: Signal,
    pub strength: Strength,
}

impl Check {
    fn positive(signal: Signal) -> Self {
        Self {
            signal,
            strength: Strength::Positive,
        }
    }

    fn negative(signal: Signal) -> Self {
        Self {
            signal,
            strength: Strength::Negative,
        }
    }

    fn weak(signal: Signal) -> Self {
        Self {
            signal,
            strength: Strength::Weak,
        }
    }
}

/// What a step was supposed to achieve.
#[derive(Debug, Clone)]
pub enum ExpectedOutcome {
    RecordCreated { title: String },
    RecordResolved,
    RecordAbsent { title: String },
    /// Every `(field, value)` must read back equal.
    FieldsPersisted { fields: Vec<(Target, String)> },
}

impl ExpectedOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            ExpectedOutcome::RecordCreated { .. } => "record created",
            ExpectedOutcome::RecordResolved => "record resolved",
            ExpectedOutcome::RecordAbsent { .. } => "record absent",
            ExpectedOutcome::FieldsPersisted { .. } => "fields persisted",
        }
    }

    /// Checks in evaluation order, and whether all positives are needed.
    fn plan(&self) -> (Vec<Check>, bool) {
        let markers = || {
            NO_RESULTS_MARKERS
                .iter()
                .map(|m| Signal::TextPresent(m.to_string()))
        };
        match self {
            ExpectedOutcome::RecordCreated { title } => {
                let mut checks = vec![
                    Check::positive(Signal::Visible(case_link(title))),
                    Check::positive(Signal::ValueNonEmpty(Field::CaseNumber.target())),
                    Check::positive(Signal::ValueEquals {
                        target: Field::CaseTitle.target(),
                        value: title.clone(),
                    }),
                ];
                checks.extend(markers().map(Check::negative));
                checks.push(Check::weak(Signal::TextPresent(title.clone())));
                (checks, false)
            }
            ExpectedOutcome::RecordResolved => (
                vec![
                    Check::positive(Signal::Visible(Field::ResolvedLabel.target())),
                    Check::positive(Signal::TextPresent("resolved successfully".into())),
                    Check::positive(Signal::Visible(Field::SuccessBanner.target())),
                    Check::positive(Signal::ValueEquals {
                        target: Field::StatusField.target(),
                        value: "Resolved".into(),
                    }),
                    Check::negative(Signal::Visible(Field::FormErrorMessage.target())),
                    Check::weak(Signal::Visible(Field::CasesListView.target())),
                    Check::weak(Signal::Absent(Field::ResolveDialog.target())),
                ],
                false,
            ),
            ExpectedOutcome::RecordAbsent { title } => {
                let mut checks: Vec<Check> = markers().map(Check::positive).collect();
                checks.push(Check::negative(Signal::Visible(case_link(title))));
                checks.push(Check::weak(Signal::Absent(case_link(title))));
                (checks, false)
            }
            ExpectedOutcome::FieldsPersisted { fields } => (
                fields
                    .iter()
                    .map(|(target, value)| {
                        Check::positive(Signal::ValueEquals {
                            target: target.clone(),
                            value: value.clone(),
                        })
                    })
                    .collect(),
                true,
            ),
        }
    }
}

/// Result of observing one check.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub signal: String,
    pub strength: Strength,
    pub fired: bool,
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub confirmed: bool,
    /// The budget ran out before a decision.
    pub inconclusive: bool,
    pub decided_by: Option<String>,
    pub evidence: Vec<Evidence>,
}

impl Verdict {
    /// One-line description for sub-validation details.
    pub fn summary(&self) -> String {
        match (self.confirmed, self.inconclusive, &self.decided_by) {
            (true, _, Some(by)) => format!("confirmed by {}", by),
            (false, _, Some(by)) => format!("refuted by {}", by),
            (_, true, None) => format!("inconclusive after {} signal(s)", self.evidence.len()),
            _ => format!("no signal among {} fired", self.evidence.len()),
        }
    }
}

/// Checks outcomes against the live page.
#[derive(Clone)]
pub struct OutcomeValidator {
    driver: Arc<dyn Driver>,
    resolver: ElementResolver,
    signal_ms: u64,
    budget_ms: u64,
    poll_ms: u64,
    accept_weak: bool,
}

impl OutcomeValidator {
    pub fn new(resolver: &ElementResolver, timeouts: &Timeouts, policy: &Policy) -> Self {
        Self {
            driver: resolver.driver().clone(),
            resolver: resolver.with_budget(0),
            signal_ms: timeouts.signal_ms,
            budget_ms: timeouts.validation_budget_ms,
            poll_ms: timeouts.poll_ms.max(1),
            accept_weak: policy.accept_weak_signals,
        }
    }

    /// Walk the checks for `expected` and decide.
    pub async fn confirm(&self, expected: &ExpectedOutcome) -> Verdict {
        let (checks, all_required) = expected.plan();
        let deadline = Instant::now() + Duration::from_millis(self.budget_ms);
        let mut evidence = Vec::new();

        let of = |strength: Strength| {
            checks
                .iter()
                .filter(move |c| c.strength == strength)
                .collect::<Vec<_>>()
        };
        let positives = of(Strength::Positive);
        let negatives = of(Strength::Negative);
        let weak = of(Strength::Weak);

        for check in positives {
            let Some(fired) = self.observe(&check.signal, deadline).await else {
                return self.out_of_budget(expected, evidence);
            };
            evidence.push(Evidence {
                signal: check.signal.to_string(),
                strength: check.strength,
                fired,
            });
            match (fired, all_required) {
                (true, false) => return self.decide(expected, true, check, evidence),
                (false, true) => return self.decide(expected, false, check, evidence),
                _ => {}
            }
        }
        if all_required && !evidence.is_empty() {
            info!("Confirmed {}: all {} checks held", expected.name(), evidence.len());
            return Verdict {
                confirmed: true,
                inconclusive: false,
                decided_by: Some("all fields".into()),
                evidence,
            };
        }

        for check in negatives {
            // Negatives are a single look; waiting for a refutation only delays.
            let Some(fired) = self.observe_once(&check.signal, deadline).await else {
                return self.out_of_budget(expected, evidence);
            };
            evidence.push(Evidence {
                signal: check.signal.to_string(),
                strength: check.strength,
                fired,
            });
            if fired {
                return self.decide(expected, false, check, evidence);
            }
        }

        if self.accept_weak {
            for check in weak {
                let Some(fired) = self.observe(&check.signal, deadline).await else {
                    return self.out_of_budget(expected, evidence);
                };
                evidence.push(Evidence {
                    signal: check.signal.to_string(),
                    strength: check.strength,
                    fired,
                });
                if fired {
                    return self.decide(expected, true, check, evidence);
                }
            }
        }

        warn!("Could not confirm {}: no signal fired", expected.name());
        Verdict {
            confirmed: false,
            inconclusive: false,
            decided_by: None,
            evidence,
        }
    }

    fn decide(
        &self,
        expected: &ExpectedOutcome,
        confirmed: bool,
        check: &Check,
        evidence: Vec<Evidence>,
    ) -> Verdict {
        if confirmed {
            info!("Confirmed {} via {}", expected.name(), check.signal);
        } else {
            warn!("{} refuted by {}", expected.name(), check.signal);
        }
        Verdict {
            confirmed,
            inconclusive: false,
            decided_by: Some(check.signal.to_string()),
            evidence,
        }
    }

    fn out_of_budget(&self, expected: &ExpectedOutcome, evidence: Vec<Evidence>) -> Verdict {
        warn!(
            "Validation of {} ran out of its {}ms budget",
            expected.name(),
            self.budget_ms
        );
        Verdict {
            confirmed: false,
            inconclusive: true,
            decided_by: None,
            evidence,
        }
    }

    /// Poll `signal` for up to the per-signal timeout. `None` when the
    /// overall deadline has already passed.
    async fn observe(&self, signal: &Signal, deadline: Instant) -> Option<bool> {
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        let until = (now + Duration::from_millis(self.signal_ms)).min(deadline);
        loop {
            if self.probe(signal).await {
                return Some(true);
            }
            if Instant::now() >= until {
                return Some(false);
            }
            self.driver.pause(self.poll_ms).await;
        }
    }

    async fn observe_once(&self, signal: &Signal, deadline: Instant) -> Option<bool> {
        if Instant::now() >= deadline {
            return None;
        }
        Some(self.probe(signal).await)
    }

    async fn probe(&self, signal: &Signal) -> bool {
        let fired = match signal {
            Signal::Visible(target) => self.resolver.is_visible(target).await,
            Signal::Absent(target) => !self.resolver.is_visible(target).await,
            Signal::TextPresent(text) => match self.driver.page_text().await {
                Ok(page) => page.to_lowercase().contains(&text.to_lowercase()),
                Err(_) => false,
            },
            Signal::ValueEquals { target, value } => self
                .read_value(target)
                .await
                .map(|v| v.trim().eq_ignore_ascii_case(value.trim()))
                .unwrap_or(false),
            Signal::ValueNonEmpty(target) => self
                .read_value(target)
                .await
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false),
            Signal::UrlContains(fragment) => self
                .driver
                .current_url()
                .await
                .map(|url| url.contains(fragment.as_str()))
                .unwrap_or(false),
        };
        debug!("signal {} -> {}", signal, fired);
        fired
    }

    /// Current value of the first visible match of `target`.
    pub async fn read_value(&self, target: &Target) -> Option<String> {
        let el = self.resolver.resolve(target).await.ok()?.into_first()?;
        self.driver.value_of(el.selector()).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{FakeDriver, FakeElement};
    use crate::random::Randomness;

    fn validator(driver: &FakeDriver, policy: Policy) -> OutcomeValidator {
        let timeouts = Timeouts {
            candidate_ms: 0,
            signal_ms: 2,
            validation_budget_ms: 1_000,
            poll_ms: 1,
            ..Timeouts::default()
        };
        let resolver = ElementResolver::new(Arc::new(driver.clone()), Randomness::seeded(3), &timeouts);
        OutcomeValidator::new(&resolver, &timeouts, &policy)
    }

    fn strict() -> Policy {
        Policy {
            accept_weak_signals: false,
            ..Policy::default()
        }
    }

    #[tokio::test]
    async fn created_record_confirmed_by_grid_link() {
        let driver = FakeDriver::new();
        driver.add(FakeElement::new("#link").tag("a").matching(r#"[title="AutoCase_QWERTY"]"#));
        let v = validator(&driver, Policy::default());
        let verdict = v
            .confirm(&ExpectedOutcome::RecordCreated {
                title: "AutoCase_QWERTY".into(),
            })
            .await;
        assert!(verdict.confirmed);
        assert!(!verdict.inconclusive);
        assert!(verdict.decided_by.unwrap().contains("Case link"));
    }

    #[tokio::test]
    async fn no_results_refutes_creation() {
        let driver = FakeDriver::new();
        driver.add(FakeElement::new("#empty").text("No results found"));
        let v = validator(&driver, Policy::default());
        let verdict = v
            .confirm(&ExpectedOutcome::RecordCreated {
                title: "AutoCase_QWERTY".into(),
            })
            .await;
        assert!(!verdict.confirmed);
        assert!(verdict.summary().starts_with("refuted by text(No results)"));
    }

    #[tokio::test]
    async fn weak_signal_needs_policy() {
        let driver = FakeDriver::new();
        driver.add(FakeElement::new("#cell").text("AutoCase_QWERTY - Query"));
        let expected = ExpectedOutcome::RecordCreated {
            title: "AutoCase_QWERTY".into(),
        };

        let accepted = validator(&driver, Policy::default()).confirm(&expected).await;
        assert!(accepted.confirmed);
        assert_eq!(accepted.decided_by.as_deref(), Some("text(AutoCase_QWERTY)"));

        let rejected = validator(&driver, strict()).confirm(&expected).await;
        assert!(!rejected.confirmed);
        assert!(!rejected.inconclusive);
    }

    #[tokio::test]
    async fn resolved_by_status_text_first() {
        let driver = FakeDriver::new();
        driver
            .add(FakeElement::new("#status").text("Resolved"))
            .add(FakeElement::new("#banner").matching(".ms-MessageBar--success"));
        let verdict = validator(&driver, strict())
            .confirm(&ExpectedOutcome::RecordResolved)
            .await;
        assert!(verdict.confirmed);
        assert_eq!(verdict.evidence.len(), 1);
        assert_eq!(verdict.decided_by.as_deref(), Some("visible(Resolved status)"));
    }

    #[tokio::test]
    async fn resolved_falls_back_to_dialog_gone() {
        let driver = FakeDriver::new();
        let lenient = validator(&driver, Policy::default())
            .confirm(&ExpectedOutcome::RecordResolved)
            .await;
        assert!(lenient.confirmed);
        assert_eq!(lenient.decided_by.as_deref(), Some("absent(Resolve dialog)"));

        let strict = validator(&driver, strict())
            .confirm(&ExpectedOutcome::RecordResolved)
            .await;
        assert!(!strict.confirmed);
    }

    #[tokio::test]
    async fn absent_record_confirmed_by_empty_grid() {
        let driver = FakeDriver::new();
        driver.add(FakeElement::new("#empty").text("No data available."));
        let verdict = validator(&driver, strict())
            .confirm(&ExpectedOutcome::RecordAbsent {
                title: "AutoCase_GONE".into(),
            })
            .await;
        assert!(verdict.confirmed);
    }

    #[tokio::test]
    async fn fields_persisted_requires_every_field() {
        let driver = FakeDriver::new();
        driver
            .add(
                FakeElement::new("#desc")
                    .tag("textarea")
                    .value("Updated")
                    .matching(r#"textarea[aria-label="Description"]"#),
            )
            .add(
                FakeElement::new("#origin")
                    .tag("select")
                    .value("Email")
                    .matching(r#"select[aria-label="Origin"]"#),
            );
        let v = validator(&driver, strict());
        let both = ExpectedOutcome::FieldsPersisted {
            fields: vec![
                (Field::Description.target(), "Updated".into()),
                (Field::OriginField.target(), "email".into()),
            ],
        };
        let verdict = v.confirm(&both).await;
        assert!(verdict.confirmed);
        assert_eq!(verdict.evidence.len(), 2);

        let wrong = ExpectedOutcome::FieldsPersisted {
            fields: vec![
                (Field::Description.target(), "Updated".into()),
                (Field::OriginField.target(), "Phone".into()),
            ],
        };
        let verdict = v.confirm(&wrong).await;
        assert!(!verdict.confirmed);
        assert!(verdict.decided_by.unwrap().contains("Origin"));
    }

    #[tokio::test]
    async fn exhausted_budget_is_inconclusive() {
        let driver = FakeDriver::new();
        let timeouts = Timeouts {
            candidate_ms: 0,
            signal_ms: 50,
            validation_budget_ms: 10,
            poll_ms: 1,
            ..Timeouts::default()
        };
        let resolver = ElementResolver::new(Arc::new(driver.clone()), Randomness::seeded(3), &timeouts);
        let v = OutcomeValidator::new(&resolver, &timeouts, &strict());
        let verdict = v
            .confirm(&ExpectedOutcome::RecordCreated {
                title: "AutoCase_LATE".into(),
            })
            .await;
        assert!(!verdict.confirmed);
        assert!(verdict.inconclusive);
        assert!(verdict.summary().starts_with("inconclusive"));
    }
}
