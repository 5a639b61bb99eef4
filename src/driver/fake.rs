//! In-memory page used by unit tests.
//!
//! Elements declare which locator expressions they satisfy instead of
//! carrying a DOM; reactions attached to clicks, keys and navigation mutate
//! the page the way the live application would.

use super::{ClickMode, Container, Cookie, Driver, ElementInfo, Locator, Tab};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Reaction = Arc<dyn Fn(&mut FakePage) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeElement {
    pub selector: String,
    pub tag: String,
    pub text: String,
    pub value: String,
    pub visible: bool,
    pub checked: bool,
    pub matches: Vec<String>,
    pub role: Option<String>,
    pub attrs: HashMap<String, String>,
    pub container: Option<Container>,
    pub parent: Option<String>,
    /// Click modes (by name) that have no effect on this element.
    pub inert: Vec<&'static str>,
    /// `fill` leaves the value unchanged; only typing works.
    pub fill_ignored: bool,
}

impl FakeElement {
    pub fn new(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            tag: "div".into(),
            visible: true,
            matches: vec![selector.to_string()],
            ..Default::default()
        }
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.into();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = value.into();
        self
    }

    pub fn matching(mut self, css: &str) -> Self {
        self.matches.push(css.into());
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.into());
        self.attrs.insert("role".into(), role.into());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn inside(mut self, parent: &str) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn in_dialog(mut self, id: &str, title: &str) -> Self {
        self.container = Some(Container {
            id: id.into(),
            title: title.into(),
        });
        self
    }

    pub fn inert(mut self, modes: &[&'static str]) -> Self {
        self.inert = modes.to_vec();
        self
    }

    pub fn fill_ignored(mut self) -> Self {
        self.fill_ignored = true;
        self
    }

    fn info(&self) -> ElementInfo {
        ElementInfo {
            selector: self.selector.clone(),
            tag: self.tag.clone(),
            text: self.text.clone(),
            value: self.value.clone(),
            visible: self.visible,
            checked: self.checked,
            attrs: self.attrs.clone(),
            container: self.container.clone(),
        }
    }

    fn accessible_name(&self) -> String {
        self.attrs
            .get("aria-label")
            .cloned()
            .unwrap_or_else(|| self.text.clone())
    }

    fn is_matched_by(&self, locator: &Locator) -> bool {
        let lc = |s: &str| s.trim().to_lowercase();
        match locator {
            Locator::Css(css) => self.matches.iter().any(|m| m == css),
            Locator::HasText { css, text } => {
                (css == "*" || self.matches.iter().any(|m| m == css))
                    && lc(&self.text).contains(&lc(text))
            }
            Locator::Text(text) => !self.text.is_empty() && lc(&self.text) == lc(text),
            Locator::Role { role, name } => {
                self.role.as_deref() == Some(role.as_str())
                    && name
                        .as_ref()
                        .map(|n| lc(&self.accessible_name()) == lc(n))
                        .unwrap_or(true)
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct FakePage {
    pub elements: Vec<FakeElement>,
    pub url: String,
    pub tabs: Vec<Tab>,
    pub dialogs: Vec<String>,
    pub cookies: Vec<Cookie>,
    pub focused: Option<String>,
    /// Every mutating call, e.g. `click:#save:standard`, `key:Escape`.
    pub log: Vec<String>,
    on_click: HashMap<String, Reaction>,
    on_key: HashMap<String, Reaction>,
    on_fill: HashMap<String, Reaction>,
    on_goto: Vec<(String, Reaction)>,
}

impl FakePage {
    pub fn add(&mut self, el: FakeElement) {
        self.elements.retain(|e| e.selector != el.selector);
        self.elements.push(el);
    }

    pub fn remove(&mut self, selector: &str) {
        self.elements.retain(|e| e.selector != selector);
    }

    pub fn element_mut(&mut self, selector: &str) -> Option<&mut FakeElement> {
        self.elements.iter_mut().find(|e| e.selector == selector)
    }

    pub fn set_visible(&mut self, selector: &str, visible: bool) {
        if let Some(el) = self.element_mut(selector) {
            el.visible = visible;
        }
    }

    pub fn set_value(&mut self, selector: &str, value: &str) {
        if let Some(el) = self.element_mut(selector) {
            el.value = value.to_string();
        }
    }

    pub fn set_text(&mut self, selector: &str, text: &str) {
        if let Some(el) = self.element_mut(selector) {
            el.text = text.to_string();
        }
    }

    fn element(&self, selector: &str) -> Option<&FakeElement> {
        self.elements.iter().find(|e| e.selector == selector)
    }

    fn run(&mut self, reaction: Option<Reaction>) {
        if let Some(r) = reaction {
            r(self);
        }
    }
}

/// A [`Driver`] over a [`FakePage`].
#[derive(Clone, Default)]
pub(crate) struct FakeDriver {
    page: Arc<Mutex<FakePage>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        driver.with(|p| p.url = "https://org.crm.dynamics.com/main.aspx".into());
        driver
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakePage) -> R) -> R {
        let mut page = self.page.lock().unwrap();
        f(&mut page)
    }

    pub fn add(&self, el: FakeElement) -> &Self {
        self.with(|p| p.add(el));
        self
    }

    pub fn on_click(&self, selector: &str, f: impl Fn(&mut FakePage) + Send + Sync + 'static) {
        self.with(|p| p.on_click.insert(selector.to_string(), Arc::new(f)));
    }

    pub fn on_key(&self, key: &str, f: impl Fn(&mut FakePage) + Send + Sync + 'static) {
        self.with(|p| p.on_key.insert(key.to_string(), Arc::new(f)));
    }

    pub fn on_fill(&self, selector: &str, f: impl Fn(&mut FakePage) + Send + Sync + 'static) {
        self.with(|p| p.on_fill.insert(selector.to_string(), Arc::new(f)));
    }

    pub fn on_goto(&self, fragment: &str, f: impl Fn(&mut FakePage) + Send + Sync + 'static) {
        self.with(|p| p.on_goto.push((fragment.to_string(), Arc::new(f))));
    }

    pub fn log(&self) -> Vec<String> {
        self.with(|p| p.log.clone())
    }

    /// Number of log entries starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.with(|p| p.log.iter().filter(|l| l.starts_with(prefix)).count())
    }

    pub fn value(&self, selector: &str) -> Option<String> {
        self.with(|p| p.element(selector).map(|e| e.value.clone()))
    }

    pub fn is_visible(&self, selector: &str) -> bool {
        self.with(|p| p.element(selector).map(|e| e.visible).unwrap_or(false))
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.with(|p| {
            p.log.push(format!("goto:{}", url));
            p.url = url.to_string();
            let hooks: Vec<Reaction> = p
                .on_goto
                .iter()
                .filter(|(fragment, _)| url.contains(fragment.as_str()))
                .map(|(_, r)| r.clone())
                .collect();
            for r in hooks {
                r(p);
            }
        });
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.with(|p| p.log.push("reload".into()));
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.with(|p| p.url.clone()))
    }

    async fn query(&self, locator: &Locator, scope: Option<&Locator>) -> Result<Vec<ElementInfo>> {
        Ok(self.with(|p| {
            let scope_root = match scope {
                Some(s) => match p.elements.iter().find(|e| e.visible && e.is_matched_by(s)) {
                    Some(root) => Some(root.selector.clone()),
                    None => return Vec::new(),
                },
                None => None,
            };
            p.elements
                .iter()
                .filter(|e| e.is_matched_by(locator))
                .filter(|e| match scope_root {
                    Some(ref root) => e.parent.as_deref() == Some(root.as_str()),
                    None => true,
                })
                .map(|e| e.info())
                .collect()
        }))
    }

    async fn click(&self, selector: &str, mode: ClickMode) -> Result<()> {
        self.with(|p| {
            let Some(el) = p.element(selector) else {
                return Err(Error::NotFound(selector.to_string()));
            };
            if mode == ClickMode::Standard && !el.visible {
                return Err(Error::NotFound(format!("{} is not visible", selector)));
            }
            let inert = el.inert.contains(&mode.name());
            p.log.push(format!("click:{}:{}", selector, mode.name()));
            if inert {
                return Ok(());
            }
            if let Some(el) = p.element_mut(selector) {
                if el.tag == "input" && el.attrs.get("type").map(|t| t == "checkbox").unwrap_or(false) {
                    el.checked = !el.checked;
                }
            }
            let reaction = p.on_click.get(selector).cloned();
            p.run(reaction);
            Ok(())
        })
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        self.with(|p| {
            if p.element(selector).is_none() {
                return Err(Error::NotFound(selector.to_string()));
            }
            p.log.push(format!("focus:{}", selector));
            p.focused = Some(selector.to_string());
            Ok(())
        })
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.with(|p| {
            p.log.push(format!("key:{}", key));
            let reaction = p.on_key.get(key).cloned();
            p.run(reaction);
        });
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.with(|p| {
            p.log.push(format!("fill:{}={}", selector, value));
            let Some(el) = p.element_mut(selector) else {
                return Err(Error::NotFound(selector.to_string()));
            };
            if !el.fill_ignored {
                el.value = value.to_string();
            }
            p.focused = Some(selector.to_string());
            let reaction = p.on_fill.get(selector).cloned();
            p.run(reaction);
            Ok(())
        })
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.with(|p| {
            p.log.push(format!("type:{}", text));
            let focused = p.focused.clone();
            if let Some(el) = focused.and_then(|f| p.element_mut(&f)) {
                el.value.push_str(text);
            }
        });
        Ok(())
    }

    async fn value_of(&self, selector: &str) -> Result<Option<String>> {
        Ok(self.with(|p| {
            p.element(selector).map(|e| {
                if matches!(e.tag.as_str(), "input" | "textarea" | "select") {
                    e.value.clone()
                } else {
                    e.text.clone()
                }
            })
        }))
    }

    async fn page_text(&self) -> Result<String> {
        Ok(self.with(|p| {
            p.elements
                .iter()
                .filter(|e| e.visible && !e.text.is_empty())
                .map(|e| e.text.clone())
                .collect::<Vec<_>>()
                .join("\n")
        }))
    }

    async fn extra_tabs(&self) -> Result<Vec<Tab>> {
        Ok(self.with(|p| p.tabs.clone()))
    }

    async fn close_tab(&self, id: &str) -> Result<()> {
        self.with(|p| {
            p.log.push(format!("close_tab:{}", id));
            p.tabs.retain(|t| t.id != id);
        });
        Ok(())
    }

    async fn take_suppressed_dialogs(&self) -> Result<Vec<String>> {
        Ok(self.with(|p| std::mem::take(&mut p.dialogs)))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG".to_vec())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        Ok(self.with(|p| p.cookies.clone()))
    }

    async fn restore_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        self.with(|p| p.cookies.extend_from_slice(cookies));
        Ok(())
    }

    async fn pause(&self, _ms: u64) {
        tokio::task::yield_now().await;
    }
}
