//! Element resolution: semantic targets to live elements.
//!
//! A [`Target`] names a UI element and lists the locators that may find it,
//! most specific first. [`ElementResolver`] walks that list with a short
//! visibility budget per candidate and returns a [`Resolution`]; running out
//! of candidates is a value, not an error.

mod filter;

pub use filter::{ElementFilter, NEVER_DISMISS, PROTECTED_DIALOG_TITLES, WORK_DIALOG_TITLES};

use crate::config::Timeouts;
use crate::driver::{Driver, ElementInfo, Locator};
use crate::random::Randomness;
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

// =============================================================================
// Model
// =============================================================================

/// How many elements a candidate is expected to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Multiple,
}

/// Which of several valid matches to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    First,
    /// Uniform pick among the first `among` valid matches (all when `None`).
    Random { among: Option<usize> },
    All,
}

/// One locator tried for a [`Target`].
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorCandidate {
    pub locator: Locator,
    pub cardinality: Cardinality,
    pub filter: ElementFilter,
}

impl LocatorCandidate {
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            cardinality: Cardinality::Single,
            filter: ElementFilter::default(),
        }
    }

    pub fn many(locator: Locator) -> Self {
        Self {
            cardinality: Cardinality::Multiple,
            ..Self::new(locator)
        }
    }

    pub fn filtered(mut self, filter: ElementFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// A semantic UI element and the ordered ways to find it.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    name: String,
    candidates: Vec<LocatorCandidate>,
    scope: Option<Locator>,
    selection: SelectionPolicy,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            candidates: Vec::new(),
            scope: None,
            selection: SelectionPolicy::First,
        }
    }

    /// Add a candidate parsed from a locator expression.
    pub fn or(self, expr: &str) -> Self {
        self.candidate(LocatorCandidate::new(Locator::parse(expr)))
    }

    /// Add a candidate expected to match several elements.
    pub fn or_many(self, expr: &str) -> Self {
        self.candidate(LocatorCandidate::many(Locator::parse(expr)))
    }

    pub fn candidate(mut self, candidate: LocatorCandidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Apply `filter` to every candidate added so far.
    pub fn filtered(mut self, filter: ElementFilter) -> Self {
        for c in &mut self.candidates {
            c.filter = filter.clone();
        }
        self
    }

    /// Only look inside the first visible match of `scope`.
    pub fn within(mut self, scope: Locator) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn select(mut self, selection: SelectionPolicy) -> Self {
        self.selection = selection;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn candidates(&self) -> &[LocatorCandidate] {
        &self.candidates
    }

    pub fn scope(&self) -> Option<&Locator> {
        self.scope.as_ref()
    }

    pub fn selection(&self) -> SelectionPolicy {
        self.selection
    }
}

/// A live element found for a target.
#[derive(Debug, Clone)]
pub struct ResolvedElement {
    pub element: ElementInfo,
    pub target: String,
    /// Index of the candidate that matched.
    pub candidate: usize,
    pub strategy: &'static str,
}

impl ResolvedElement {
    pub fn selector(&self) -> &str {
        &self.element.selector
    }

    pub fn label(&self) -> &str {
        self.element.label()
    }
}

/// Outcome of resolving a target.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Non-empty; one element unless the policy is `All`.
    Found(Vec<ResolvedElement>),
    NotFound { target: String, tried: usize },
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    pub fn first(&self) -> Option<&ResolvedElement> {
        match self {
            Resolution::Found(found) => found.first(),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn into_first(self) -> Option<ResolvedElement> {
        match self {
            Resolution::Found(found) => found.into_iter().next(),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn into_all(self) -> Vec<ResolvedElement> {
        match self {
            Resolution::Found(found) => found,
            Resolution::NotFound { .. } => Vec::new(),
        }
    }

    /// For callers that cannot continue without the element.
    pub fn required(self) -> Result<ResolvedElement> {
        match self {
            Resolution::Found(found) => found
                .into_iter()
                .next()
                .ok_or_else(|| Error::NotFound("empty resolution".into())),
            Resolution::NotFound { target, tried } => Err(Error::NotFound(format!(
                "{} ({} candidates tried)",
                target, tried
            ))),
        }
    }
}

// =============================================================================
// first_matching
// =============================================================================

/// Result of [`first_matching`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match<T> {
    Found { index: usize, value: T },
    NotFound,
}

impl<T> Match<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Match::Found { .. })
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Match::Found { value, .. } => Some(value),
            Match::NotFound => None,
        }
    }
}

/// Probe `items` in order and stop at the first that yields a value.
pub async fn first_matching<'a, T, R, F, Fut>(items: &'a [T], mut probe: F) -> Match<R>
where
    F: FnMut(usize, &'a T) -> Fut,
    Fut: Future<Output = Option<R>>,
{
    for (index, item) in items.iter().enumerate() {
        if let Some(value) = probe(index, item).await {
            return Match::Found { index, value };
        }
    }
    Match::NotFound
}

// =============================================================================
// Resolver
// =============================================================================

/// Finds visible, valid elements for targets. Never mutates the page.
#[derive(Clone)]
pub struct ElementResolver {
    driver: Arc<dyn Driver>,
    rng: Randomness,
    candidate_ms: u64,
    poll_ms: u64,
}

impl ElementResolver {
    pub fn new(driver: Arc<dyn Driver>, rng: Randomness, timeouts: &Timeouts) -> Self {
        Self {
            driver,
            rng,
            candidate_ms: timeouts.candidate_ms,
            poll_ms: timeouts.poll_ms.max(1),
        }
    }

    /// Same resolver with a different per-candidate budget.
    pub fn with_budget(&self, candidate_ms: u64) -> Self {
        Self {
            candidate_ms,
            ..self.clone()
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub async fn resolve(&self, target: &Target) -> Result<Resolution> {
        self.resolve_in(target, target.scope()).await
    }

    /// Resolve inside an explicit scope, overriding the target's own.
    pub async fn resolve_in(&self, target: &Target, scope: Option<&Locator>) -> Result<Resolution> {
        if target.candidates().is_empty() {
            return Err(Error::Config(format!(
                "target '{}' has no candidates",
                target.name()
            )));
        }

        let found = first_matching(target.candidates(), |i, candidate| async move {
            let matches = self.probe(candidate, scope).await;
            if matches.is_empty() {
                debug!("{}: candidate {} ({}) no match", target.name(), i, candidate.locator);
                None
            } else {
                Some(matches)
            }
        })
        .await;

        match found {
            Match::Found { index, value } => {
                let candidate = &target.candidates()[index];
                let chosen = self.apply_policy(target, candidate, value);
                debug!(
                    "{}: resolved via candidate {} ({}), {} element(s)",
                    target.name(),
                    index,
                    candidate.locator,
                    chosen.len()
                );
                Ok(Resolution::Found(
                    chosen
                        .into_iter()
                        .map(|element| ResolvedElement {
                            element,
                            target: target.name().to_string(),
                            candidate: index,
                            strategy: candidate.locator.strategy(),
                        })
                        .collect(),
                ))
            }
            Match::NotFound => Ok(Resolution::NotFound {
                target: target.name().to_string(),
                tried: target.candidates().len(),
            }),
        }
    }

    /// Try several targets in order.
    pub async fn resolve_any(&self, targets: &[&Target]) -> Result<Resolution> {
        let mut tried = 0;
        for target in targets {
            match self.resolve(target).await? {
                found @ Resolution::Found(_) => return Ok(found),
                Resolution::NotFound { tried: n, .. } => tried += n,
            }
        }
        Ok(Resolution::NotFound {
            target: targets
                .iter()
                .map(|t| t.name())
                .collect::<Vec<_>>()
                .join(" | "),
            tried,
        })
    }

    /// Every valid match of every candidate, deduplicated by selector.
    ///
    /// Used for bulk operations where different candidates find different
    /// instances, such as closing all popups at once.
    pub async fn resolve_every(&self, target: &Target) -> Result<Vec<ResolvedElement>> {
        if target.candidates().is_empty() {
            return Err(Error::Config(format!(
                "target '{}' has no candidates",
                target.name()
            )));
        }
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (index, candidate) in target.candidates().iter().enumerate() {
            for element in self.probe(candidate, target.scope()).await {
                if seen.insert(element.selector.clone()) {
                    out.push(ResolvedElement {
                        element,
                        target: target.name().to_string(),
                        candidate: index,
                        strategy: candidate.locator.strategy(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Whether the target resolves within the budget. Errors count as absent.
    /// Cycle through every candidate until one shows a valid match or
    /// `budget_ms` runs out.
    pub async fn wait_visible(&self, target: &Target, budget_ms: u64) -> Option<ResolvedElement> {
        let quick = self.with_budget(0);
        let deadline = Instant::now() + Duration::from_millis(budget_ms);
        loop {
            if let Ok(Resolution::Found(found)) = quick.resolve(target).await {
                return found.into_iter().next();
            }
            if Instant::now() >= deadline {
                return None;
            }
            self.driver.pause(self.poll_ms).await;
        }
    }

    pub async fn is_visible(&self, target: &Target) -> bool {
        matches!(self.resolve(target).await, Ok(Resolution::Found(_)))
    }

    /// Poll one candidate until it yields valid matches or its budget runs out.
    async fn probe(&self, candidate: &LocatorCandidate, scope: Option<&Locator>) -> Vec<ElementInfo> {
        let deadline = Instant::now() + Duration::from_millis(self.candidate_ms);
        loop {
            match self.driver.query(&candidate.locator, scope).await {
                Ok(elements) => {
                    let valid: Vec<ElementInfo> = elements
                        .into_iter()
                        .filter(|e| e.visible && candidate.filter.accepts(e))
                        .collect();
                    if !valid.is_empty() {
                        return valid;
                    }
                }
                Err(e) => debug!("query {} failed: {}", candidate.locator, e),
            }
            if Instant::now() >= deadline {
                return Vec::new();
            }
            self.driver.pause(self.poll_ms).await;
        }
    }

    fn apply_policy(
        &self,
        target: &Target,
        candidate: &LocatorCandidate,
        mut valid: Vec<ElementInfo>,
    ) -> Vec<ElementInfo> {
        if candidate.cardinality == Cardinality::Single {
            valid.truncate(1);
        }
        match target.selection() {
            SelectionPolicy::All => valid,
            SelectionPolicy::First => {
                valid.truncate(1);
                valid
            }
            SelectionPolicy::Random { among } => {
                let pool = among.unwrap_or(valid.len()).min(valid.len());
                let pick = self.rng.index(pool).unwrap_or(0);
                vec![valid.swap_remove(pick)]
            }
        }
    }
}
