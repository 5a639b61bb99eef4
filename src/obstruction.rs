//! Dismissing transient obstructions.
//!
//! Dialogs, assistant popovers and stray tabs can appear at any point, so
//! the handler runs both on a background interval and explicitly between
//! workflow steps. All of it is best effort: failures are logged and
//! recorded, never raised.

use crate::driver::{ClickMode, Driver, Locator};
use crate::resolve::{ElementResolver, ResolvedElement, PROTECTED_DIALOG_TITLES, WORK_DIALOG_TITLES};
use crate::targets::Field;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const MAX_EVENTS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstructionKind {
    NativeDialog,
    ExtraTab,
    Popup,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObstructionAction {
    Dismissed,
    Closed,
    Skipped(String),
    Failed(String),
}

/// One detected blocker and what was done about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObstructionEvent {
    pub kind: ObstructionKind,
    /// Identity used for de-duplication (container id, tab id, message).
    pub token: String,
    pub action: ObstructionAction,
}

impl fmt::Display for ObstructionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} -> {:?}", self.kind, self.token, self.action)
    }
}

/// Memory of what the handler has already dealt with.
#[derive(Debug, Default)]
pub struct ObstructionState {
    /// Popups dismissed and still visible at the last sweep.
    dismissed: HashSet<String>,
    /// Business-error dialogs already reported.
    reported: HashSet<String>,
    dismissals: usize,
    events: Vec<ObstructionEvent>,
}

impl ObstructionState {
    fn record(&mut self, event: ObstructionEvent) {
        if self.events.len() >= MAX_EVENTS {
            self.events.remove(0);
        }
        self.events.push(event);
    }
}

/// De-duplication token for a dismissable element.
fn identity(el: &ResolvedElement) -> String {
    if let Some(ref c) = el.element.container {
        return format!("container:{}", c.id);
    }
    if let Some(id) = el.element.attr("id") {
        return format!("id:{}", id);
    }
    format!("path:{}|{}", el.selector(), el.label())
}

/// Detects and dismisses obstructions. Owned by one browser context.
pub struct ObstructionHandler {
    driver: Arc<dyn Driver>,
    resolver: ElementResolver,
    state: Mutex<ObstructionState>,
}

impl ObstructionHandler {
    pub fn new(resolver: &ElementResolver) -> Self {
        Self {
            driver: resolver.driver().clone(),
            resolver: resolver.with_budget(0),
            state: Mutex::new(ObstructionState::default()),
        }
    }

    /// One pass over every obstruction source.
    pub async fn sweep(&self) -> Vec<ObstructionEvent> {
        let mut state = self.state.lock().await;
        let mut events = Vec::new();

        match self.driver.take_suppressed_dialogs().await {
            Ok(messages) => {
                for message in messages {
                    debug!("suppressed native dialog: {}", message);
                    events.push(ObstructionEvent {
                        kind: ObstructionKind::NativeDialog,
                        token: message,
                        action: ObstructionAction::Dismissed,
                    });
                }
            }
            Err(e) => debug!("dialog hook unavailable: {}", e),
        }

        match self.driver.extra_tabs().await {
            Ok(tabs) => {
                for tab in tabs {
                    let action = match self.driver.close_tab(&tab.id).await {
                        Ok(()) => {
                            info!("Closed extra tab: {}", tab.url);
                            ObstructionAction::Closed
                        }
                        Err(e) => {
                            warn!("Failed to close tab {}: {}", tab.url, e);
                            ObstructionAction::Failed(e.to_string())
                        }
                    };
                    events.push(ObstructionEvent {
                        kind: ObstructionKind::ExtraTab,
                        token: tab.id,
                        action,
                    });
                }
            }
            Err(e) => debug!("tab listing failed: {}", e),
        }

        self.report_protected_dialogs(&mut state, &mut events).await;

        let mut visible = HashSet::new();
        for (kind, field, mode) in [
            (ObstructionKind::Popup, Field::ModalCloseButtons, ClickMode::Forced),
            (ObstructionKind::Assistant, Field::AssistantDismissButtons, ClickMode::Standard),
        ] {
            let found = match self.resolver.resolve_every(&field.target()).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("{:?} sweep skipped: {}", kind, e);
                    continue;
                }
            };
            for el in found {
                let token = identity(&el);
                if !visible.insert(token.clone()) || state.dismissed.contains(&token) {
                    continue;
                }
                let action = self.dismiss(&el, mode).await;
                if action == ObstructionAction::Dismissed {
                    state.dismissed.insert(token.clone());
                    state.dismissals += 1;
                }
                events.push(ObstructionEvent {
                    kind,
                    token,
                    action,
                });
            }
        }
        // Forget popups that are gone so a later one reusing the id is handled.
        state.dismissed.retain(|t| visible.contains(t));

        for event in &events {
            state.record(event.clone());
        }
        events
    }

    /// [`sweep`](Self::sweep), then Escape if anything was dismissed.
    ///
    /// The background poller never presses keys; explicit sweeps between
    /// steps do.
    pub async fn sweep_thorough(&self) -> Vec<ObstructionEvent> {
        let events = self.sweep().await;
        let dismissed_popup = events.iter().any(|e| {
            matches!(e.kind, ObstructionKind::Popup | ObstructionKind::Assistant)
                && e.action == ObstructionAction::Dismissed
        });
        if dismissed_popup {
            // Escape would also close the dialog the journey is working in.
            if let Some(title) = self.titled_dialog(WORK_DIALOG_TITLES).await {
                debug!("not pressing Escape over '{}'", title);
                return events;
            }
            if let Err(e) = self.driver.press_key("Escape").await {
                debug!("escape after sweep failed: {}", e);
            }
        }
        events
    }

    /// Title of a visible business-error dialog, if any.
    pub async fn protected_dialog(&self) -> Option<String> {
        self.titled_dialog(PROTECTED_DIALOG_TITLES).await
    }

    async fn titled_dialog(&self, titles: &[&str]) -> Option<String> {
        for &title in titles {
            let locator = Locator::has_text(
                r#"[role="dialog"], [role="alertdialog"], [id^="modalDialogRoot_"]"#,
                title,
            );
            if let Ok(found) = self.driver.query(&locator, None).await {
                if found.iter().any(|e| e.visible) {
                    return Some(title.to_string());
                }
            }
        }
        None
    }

    async fn report_protected_dialogs(
        &self,
        state: &mut ObstructionState,
        events: &mut Vec<ObstructionEvent>,
    ) {
        match self.protected_dialog().await {
            Some(title) => {
                if state.reported.insert(title.clone()) {
                    warn!("Leaving business error dialog open: {}", title);
                    events.push(ObstructionEvent {
                        kind: ObstructionKind::Popup,
                        token: title,
                        action: ObstructionAction::Skipped("business error".into()),
                    });
                }
            }
            None => state.reported.clear(),
        }
    }

    async fn dismiss(&self, el: &ResolvedElement, mode: ClickMode) -> ObstructionAction {
        let first = self.driver.click(el.selector(), mode).await;
        let result = match first {
            Err(_) if mode == ClickMode::Standard => {
                self.driver.click(el.selector(), ClickMode::Forced).await
            }
            other => other,
        };
        match result {
            Ok(()) => {
                info!("Dismissed {} '{}'", el.target, el.label());
                ObstructionAction::Dismissed
            }
            Err(e) => {
                debug!("Could not dismiss '{}': {}", el.label(), e);
                ObstructionAction::Failed(e.to_string())
            }
        }
    }

    /// Total successful dismissals so far.
    pub async fn dismissals(&self) -> usize {
        self.state.lock().await.dismissals
    }

    /// Recorded events, oldest first.
    pub async fn events(&self) -> Vec<ObstructionEvent> {
        self.state.lock().await.events.clone()
    }

    /// Sweep every `interval` until the returned guard is dropped.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) -> PollerGuard {
        let handler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let events = handler.sweep().await;
                if !events.is_empty() {
                    debug!("background sweep handled {} obstruction(s)", events.len());
                }
            }
        });
        PollerGuard {
            handle: Some(handle),
        }
    }
}

/// Stops the background poller when dropped.
pub struct PollerGuard {
    handle: Option<JoinHandle<()>>,
}

impl PollerGuard {
    /// Stop the poller and wait until its task has let go of the handler.
    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for PollerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::driver::fake::{FakeDriver, FakeElement};
    use crate::driver::Tab;
    use crate::random::Randomness;

    const CLOSE_ICON: &str = r#"button[data-id="dialogCloseIconButton"]"#;
    const GOT_IT: &str = "button";

    fn handler(driver: &FakeDriver) -> Arc<ObstructionHandler> {
        let timeouts = Timeouts {
            candidate_ms: 0,
            poll_ms: 1,
            ..Timeouts::default()
        };
        let resolver = ElementResolver::new(Arc::new(driver.clone()), Randomness::seeded(1), &timeouts);
        Arc::new(ObstructionHandler::new(&resolver))
    }

    fn modal(driver: &FakeDriver, root: &str, title: &str) {
        driver.add(
            FakeElement::new(&format!("#{}-close", root))
                .tag("button")
                .attr("aria-label", "Close")
                .matching(CLOSE_ICON)
                .in_dialog(root, title),
        );
    }

    #[tokio::test]
    async fn second_sweep_is_a_no_op() {
        let driver = FakeDriver::new();
        // The close button does nothing, so the popup stays up.
        modal(&driver, "modalDialogRoot_1", "Welcome");
        driver.with(|p| p.element_mut("#modalDialogRoot_1-close").unwrap().inert = vec!["forced"]);
        let h = handler(&driver);

        let first = h.sweep().await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].action, ObstructionAction::Dismissed);
        assert_eq!(driver.count("click:"), 1);

        let second = h.sweep().await;
        assert!(second.is_empty());
        assert_eq!(driver.count("click:"), 1);
        assert_eq!(h.dismissals().await, 1);
    }

    #[tokio::test]
    async fn memory_resets_once_popup_is_gone() {
        let driver = FakeDriver::new();
        modal(&driver, "modalDialogRoot_1", "Welcome");
        driver.on_click("#modalDialogRoot_1-close", |p| p.remove("#modalDialogRoot_1-close"));
        let h = handler(&driver);

        assert_eq!(h.sweep().await.len(), 1);
        assert!(h.sweep().await.is_empty());

        // Same container id comes back later.
        modal(&driver, "modalDialogRoot_1", "Welcome");
        let again = h.sweep().await;
        assert_eq!(again.len(), 1);
        assert_eq!(h.dismissals().await, 2);
    }

    #[tokio::test]
    async fn business_errors_are_left_open() {
        let driver = FakeDriver::new();
        modal(&driver, "modalDialogRoot_2", "Business Process Error");
        driver.add(
            FakeElement::new("#bpe")
                .text("Business Process Error")
                .matching(r#"[role="dialog"], [role="alertdialog"], [id^="modalDialogRoot_"]"#),
        );
        let h = handler(&driver);

        let events = h.sweep().await;
        assert_eq!(driver.count("click:"), 0);
        assert_eq!(
            events,
            vec![ObstructionEvent {
                kind: ObstructionKind::Popup,
                token: "Business Process Error".into(),
                action: ObstructionAction::Skipped("business error".into()),
            }]
        );
        // Reported once per appearance.
        assert!(h.sweep().await.is_empty());
        assert_eq!(
            h.protected_dialog().await.as_deref(),
            Some("Business Process Error")
        );
    }

    #[tokio::test]
    async fn work_dialog_stays_open_and_gets_no_escape() {
        let driver = FakeDriver::new();
        modal(&driver, "modalDialogRoot_3", "Resolve Case");
        driver.add(
            FakeElement::new("#resolve-dlg")
                .text("Resolve Case")
                .matching(r#"[role="dialog"], [role="alertdialog"], [id^="modalDialogRoot_"]"#),
        );
        modal(&driver, "modalDialogRoot_4", "Rate your experience");
        driver.on_click("#modalDialogRoot_4-close", |p| p.remove("#modalDialogRoot_4-close"));
        let h = handler(&driver);

        let events = h.sweep_thorough().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ObstructionAction::Dismissed);
        assert_eq!(driver.count("click:#modalDialogRoot_3-close"), 0);
        assert_eq!(driver.count("key:Escape"), 0);
    }

    #[tokio::test]
    async fn never_touches_learn_more_or_save_and_close() {
        let driver = FakeDriver::new();
        driver
            .add(
                FakeElement::new("#learn")
                    .tag("button")
                    .text("Got it - Learn more")
                    .matching(GOT_IT),
            )
            .add(
                FakeElement::new("#saveclose")
                    .tag("button")
                    .attr("aria-label", "Save & Close")
                    .matching(r#"[data-testid*="dismiss"]"#),
            )
            .add(
                FakeElement::new("#ok")
                    .tag("button")
                    .text("Got it")
                    .matching(GOT_IT),
            );
        let h = handler(&driver);
        let events = h.sweep().await;
        assert_eq!(events.len(), 1);
        assert_eq!(driver.log(), vec!["click:#ok:standard".to_string()]);
    }

    #[tokio::test]
    async fn skips_close_buttons_with_lp_id() {
        let driver = FakeDriver::new();
        driver.add(
            FakeElement::new("#form-close")
                .tag("button")
                .attr("data-lp-id", "form|incident")
                .matching(CLOSE_ICON),
        );
        let h = handler(&driver);
        assert!(h.sweep().await.is_empty());
        assert_eq!(driver.count("click:"), 0);
    }

    #[tokio::test]
    async fn closes_extra_tabs_and_drains_dialogs() {
        let driver = FakeDriver::new();
        driver.with(|p| {
            p.tabs.push(Tab {
                id: "T2".into(),
                url: "mailto:support@contoso.com".into(),
            });
            p.dialogs.push("Open Pick an app?".into());
        });
        let h = handler(&driver);
        let events = h.sweep().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ObstructionKind::NativeDialog);
        assert_eq!(events[1].kind, ObstructionKind::ExtraTab);
        assert_eq!(events[1].action, ObstructionAction::Closed);
        assert!(driver.with(|p| p.tabs.is_empty()));
        assert!(h.sweep().await.is_empty());
        assert_eq!(h.events().await.len(), 2);
    }

    #[tokio::test]
    async fn thorough_sweep_presses_escape_only_after_dismissal() {
        let driver = FakeDriver::new();
        let h = handler(&driver);
        h.sweep_thorough().await;
        assert_eq!(driver.count("key:Escape"), 0);

        driver.add(FakeElement::new("#ok").tag("button").text("Got it").matching(GOT_IT));
        driver.on_click("#ok", |p| p.remove("#ok"));
        h.sweep_thorough().await;
        assert_eq!(driver.count("key:Escape"), 1);
    }

    #[tokio::test]
    async fn poller_sweeps_until_dropped() {
        let driver = FakeDriver::new();
        let h = handler(&driver);
        let guard = h.spawn_poller(Duration::from_millis(5));
        driver.add(FakeElement::new("#ok").tag("button").text("Got it").matching(GOT_IT));
        driver.on_click("#ok", |p| p.remove("#ok"));
        for _ in 0..200 {
            if h.dismissals().await > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.dismissals().await, 1);
        drop(guard);
        tokio::time::sleep(Duration::from_millis(20)).await;
        driver.add(FakeElement::new("#ok2").tag("button").text("Got it").matching(GOT_IT));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(h.dismissals().await, 1);
    }
}
