//! Browser seam.
//!
//! Everything above this module talks to a [`Driver`], never to `eoka`
//! directly. [`EokaDriver`] is the live implementation; unit tests run the
//! same code against an in-memory page.

mod browser;
#[cfg(test)]
pub(crate) mod fake;

pub use browser::EokaDriver;

use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

static ROLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^role=([\w-]+)(?:\[name="(.*)"\])?$"#).expect("valid role pattern")
});
static HAS_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(.*):has-text\("(.*)"\)$"#).expect("valid has-text pattern"));

/// A selector expression plus the strategy used to evaluate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Plain CSS, usually an attribute match.
    Css(String),
    /// CSS constrained to elements whose visible text contains `text`.
    HasText { css: String, text: String },
    /// Any interactive element whose visible text equals `text`.
    Text(String),
    /// ARIA role with an optional accessible name.
    Role { role: String, name: Option<String> },
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Locator::Css(css.into())
    }

    pub fn has_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Locator::HasText {
            css: css.into(),
            text: text.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text(text.into())
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: Some(name.into()),
        }
    }

    /// Parse a locator expression.
    ///
    /// Accepts `text=Save`, `role=button[name="Save"]`,
    /// `button:has-text("Save")` and plain CSS.
    pub fn parse(expr: &str) -> Self {
        let expr = expr.trim();
        if let Some(t) = expr.strip_prefix("text=") {
            return Locator::Text(t.trim_matches('"').to_string());
        }
        if let Some(loc) = parse_role(expr) {
            return loc;
        }
        if let Some(loc) = parse_has_text(expr) {
            return loc;
        }
        Locator::Css(expr.to_string())
    }

    /// Strategy tag: attribute, text or role matching.
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "attribute",
            Locator::HasText { .. } | Locator::Text(_) => "text",
            Locator::Role { .. } => "role",
        }
    }

    /// Arguments for the page-side query script: (kind, css, text).
    pub(crate) fn js_args(&self) -> (&'static str, &str, &str) {
        match self {
            Locator::Css(css) => ("css", css, ""),
            Locator::HasText { css, text } => ("has_text", css, text),
            Locator::Text(text) => ("text", "", text),
            Locator::Role { role, name } => ("role", role, name.as_deref().unwrap_or("")),
        }
    }
}

fn parse_role(expr: &str) -> Option<Locator> {
    let caps = ROLE_RE.captures(expr)?;
    Some(Locator::Role {
        role: caps.get(1)?.as_str().to_string(),
        name: caps.get(2).map(|m| m.as_str().to_string()),
    })
}

fn parse_has_text(expr: &str) -> Option<Locator> {
    let caps = HAS_TEXT_RE.captures(expr)?;
    let css = caps.get(1)?.as_str();
    Some(Locator::HasText {
        css: if css.is_empty() { "*" } else { css }.to_string(),
        text: caps.get(2)?.as_str().to_string(),
    })
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(css) => write!(f, "{}", css),
            Locator::HasText { css, text } => write!(f, "{}:has-text(\"{}\")", css, text),
            Locator::Text(text) => write!(f, "text={}", text),
            Locator::Role { role, name: None } => write!(f, "role={}", role),
            Locator::Role {
                role,
                name: Some(name),
            } => write!(f, "role={}[name=\"{}\"]", role, name),
        }
    }
}

/// How a click is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    /// Regular click through the automation library.
    Standard,
    /// Synthetic pointer sequence sent straight to the element, ignoring overlays.
    Forced,
    /// Click at an offset from the element's top-left corner.
    Offset { x: i32, y: i32 },
    /// `element.click()`.
    Scripted,
    /// A single bubbling `click` event.
    Dispatched,
    /// Two clicks plus a `dblclick` event.
    Double,
}

impl ClickMode {
    pub fn name(&self) -> &'static str {
        match self {
            ClickMode::Standard => "standard",
            ClickMode::Forced => "forced",
            ClickMode::Offset { .. } => "offset",
            ClickMode::Scripted => "scripted",
            ClickMode::Dispatched => "dispatched",
            ClickMode::Double => "double",
        }
    }
}

/// Dialog container an element lives in.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Snapshot of a live element taken at query time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementInfo {
    /// Unique CSS path usable for follow-up actions.
    pub selector: String,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub attrs: HashMap<String, String>,
    #[serde(default)]
    pub container: Option<Container>,
}

impl ElementInfo {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(|s| s.as_str())
    }

    /// Visible text, or the aria-label for icon-only controls.
    pub fn label(&self) -> &str {
        let text = self.text.trim();
        if text.is_empty() {
            self.attr("aria-label").unwrap_or("").trim()
        } else {
            text
        }
    }
}

/// A browser tab other than the primary page.
#[derive(Debug, Clone)]
pub struct Tab {
    pub id: String,
    pub url: String,
}

/// A cookie as stored in the session-state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Page operations the interaction layer consumes.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// All elements matching `locator`, optionally inside the first visible `scope`.
    async fn query(&self, locator: &Locator, scope: Option<&Locator>) -> Result<Vec<ElementInfo>>;

    async fn click(&self, selector: &str, mode: ClickMode) -> Result<()>;

    async fn focus(&self, selector: &str) -> Result<()>;

    async fn press_key(&self, key: &str) -> Result<()>;

    /// Replace the value of an input wholesale.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Type into the focused element.
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Current value of an input, `None` when the element is gone.
    async fn value_of(&self, selector: &str) -> Result<Option<String>>;

    async fn page_text(&self) -> Result<String>;

    /// Tabs other than the primary page.
    async fn extra_tabs(&self) -> Result<Vec<Tab>>;

    async fn close_tab(&self, id: &str) -> Result<()>;

    /// Messages of native dialogs suppressed since the last call.
    ///
    /// Also (re)installs the page hook that suppresses them and blocks
    /// `mailto:` navigation.
    async fn take_suppressed_dialogs(&self) -> Result<Vec<String>>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn cookies(&self) -> Result<Vec<Cookie>>;

    async fn restore_cookies(&self, cookies: &[Cookie]) -> Result<()>;

    async fn pause(&self, ms: u64) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}
