use crate::driver::ElementInfo;

/// Dialog titles reporting business-rule failures. Their controls are never
/// touched by the obstruction sweep.
pub const PROTECTED_DIALOG_TITLES: &[&str] =
    &["Business Process Error", "Subject Configuration Missing"];

/// Dialogs a journey works inside. Sweeps leave them open but never report
/// them.
pub const WORK_DIALOG_TITLES: &[&str] = &["Resolve Case", "Lookup Records", "Confirm Deletion"];

/// Labels a generic dismiss or close action must never hit.
pub const NEVER_DISMISS: &[&str] = &["Learn more", "Save &"];

/// Predicate a match must pass before a candidate accepts it.
///
/// Text checks look at the visible text, the aria-label and the title and
/// are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementFilter {
    require_text: Vec<String>,
    exclude_text: Vec<String>,
    exclude_exact: Vec<String>,
    exclude_attrs: Vec<String>,
    exclude_containers: Vec<String>,
}

impl ElementFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only elements whose label contains `text`.
    pub fn require(mut self, text: &str) -> Self {
        self.require_text.push(text.to_lowercase());
        self
    }

    /// Reject elements whose label contains `text`.
    pub fn exclude(mut self, text: &str) -> Self {
        self.exclude_text.push(text.to_lowercase());
        self
    }

    /// Reject elements whose label is exactly `text`.
    pub fn exclude_exact(mut self, text: &str) -> Self {
        self.exclude_exact.push(text.to_lowercase());
        self
    }

    /// Reject elements carrying attribute `name`.
    pub fn without_attr(mut self, name: &str) -> Self {
        self.exclude_attrs.push(name.to_string());
        self
    }

    /// Reject elements inside a dialog whose title contains `title`.
    pub fn outside_dialog(mut self, title: &str) -> Self {
        self.exclude_containers.push(title.to_lowercase());
        self
    }

    /// Filter for generic dismiss buttons: never informational links or save
    /// actions, and nothing inside business-error or work dialogs.
    pub fn dismiss_safe() -> Self {
        let filter = NEVER_DISMISS
            .iter()
            .fold(Self::new(), |f, text| f.exclude(text));
        PROTECTED_DIALOG_TITLES
            .iter()
            .chain(WORK_DIALOG_TITLES)
            .fold(filter, |f, title| f.outside_dialog(title))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn accepts(&self, el: &ElementInfo) -> bool {
        let labels: Vec<String> = [
            Some(el.text.as_str()),
            el.attr("aria-label"),
            el.attr("title"),
        ]
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

        if self
            .require_text
            .iter()
            .any(|needle| !labels.iter().any(|l| l.contains(needle.as_str())))
        {
            return false;
        }
        if labels.iter().any(|l| {
            self.exclude_text.iter().any(|n| l.contains(n.as_str()))
                || self.exclude_exact.iter().any(|n| l == n)
        }) {
            return false;
        }
        if self.exclude_attrs.iter().any(|a| el.attrs.contains_key(a)) {
            return false;
        }
        if let Some(ref container) = el.container {
            let title = container.title.to_lowercase();
            if self.exclude_containers.iter().any(|t| title.contains(t.as_str())) {
                return false;
            }
        }
        true
    }
}
