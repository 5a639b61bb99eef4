//! Locator table for the Customer Service app.
//!
//! Every workflow looks up its elements here; candidate order is most
//! specific first.

use crate::driver::Locator;
use crate::resolve::{ElementFilter, SelectionPolicy, Target};

/// Logical UI elements used by the journeys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    // Navigation
    ServiceArea,
    CasesNavItem,
    CasesListView,
    ViewSearchBox,
    NewCaseButton,
    RowCheckboxes,
    CaseRowLinks,

    // Case form
    CaseTitle,
    CaseNumber,
    SubjectSearchButton,
    SubjectInput,
    CustomerSearchButton,
    CustomerInput,
    OriginField,
    Description,
    SaveButton,
    SaveAndCloseButton,
    FormErrorOk,
    FormErrorMessage,

    // Dropdowns and lookups
    OpenListOptions,
    LookupDialog,
    LookupAdvancedLink,
    LookupRecordRows,
    LookupDone,

    // Resolve and delete
    MoreCommands,
    ResolveCaseButton,
    ResolutionField,
    ResolveConfirm,
    ResolveDialog,
    DeleteButton,
    DeleteConfirm,

    // Outcome markers
    ResolvedLabel,
    SuccessBanner,
    StatusField,

    // Login
    LoginEmail,
    LoginNext,
    LoginPassword,
    StaySignedInYes,
    LoggedInIndicator,

    // Obstructions
    ModalCloseButtons,
    AssistantDismissButtons,
}

/// Scope used for anything inside the open dialog.
pub fn dialog_scope() -> Locator {
    Locator::css(r#"[role="dialog"], .ms-Dialog, [id^="modalDialogRoot_"]"#)
}

impl Field {
    pub fn target(self) -> Target {
        match self {
            Field::ServiceArea => Target::new("Service area")
                .or(r#"[aria-label="Service"] button"#)
                .or(r#"button:has-text("Service")"#)
                .or(r#"[role="button"]:has-text("Service")"#),
            Field::CasesNavItem => Target::new("Cases navigation")
                .or(r#"[data-id="sitemap-entity-incident"]"#)
                .or(r#"li[data-id="sitemap-entity-incident"] a"#)
                .or(r#"li[role="treeitem"][aria-label="Cases"]"#)
                .or(r#"[role="navigation"] a:has-text("Cases")"#)
                .or(r#".ms-Nav-linkText:has-text("Cases")"#)
                .or("role=treeitem[name=\"Cases\"]")
                .or(r#"[title="Cases"]"#),
            Field::CasesListView => Target::new("Cases list view")
                .or("text=My Active Cases")
                .or("text=Active Cases")
                .or(r#"[aria-label*="Cases"][role="grid"]"#)
                .or(r#"[data-id*="cases"] [role="grid"]"#),
            Field::ViewSearchBox => Target::new("View search box")
                .or(r#"input[aria-label="Case Filter by keyword"]"#)
                .or(r#"[aria-label*="Filter by keyword"]"#)
                .or(r#"[placeholder*="Filter by keyword"]"#)
                .or(r#"[aria-label*="Search this view"]"#)
                .or(r#"[placeholder*="Search this view"]"#)
                .or(r#"input[role="searchbox"]"#)
                .or(r#"input[type="search"]"#),
            Field::NewCaseButton => Target::new("New Case button")
                .or(r#"button[aria-label="New Case"]"#)
                .or(r#"[data-id="new_case"]"#)
                .or(r#"[title="New Case"]"#)
                .or(r#"button:has-text("New")"#)
                .filtered(ElementFilter::new().exclude("new window").exclude("view")),
            Field::RowCheckboxes => Target::new("Row checkboxes")
                .or_many(r#"input[type="checkbox"][aria-label="select or deselect the row"]"#)
                .or_many(r#"input[type="checkbox"][aria-label*="select or deselect the row"]"#)
                .select(SelectionPolicy::All),
            Field::CaseRowLinks => Target::new("Case row links")
                .or_many(r#"div[col-id="title"] a[role="link"]"#)
                .or_many(r#"[role="gridcell"] a[aria-label]"#)
                .select(SelectionPolicy::All),

            Field::CaseTitle => Target::new("Case Title")
                .or(r#"input[aria-label="Case Title"]"#)
                .or(r#"[aria-label="Case Title"]"#)
                .or(r#"[data-id*="title"] input"#),
            Field::CaseNumber => Target::new("Case number")
                .or(r#"input[aria-label="ID"]"#)
                .or(r#"input[aria-label="Case Number"]"#)
                .or(r#"[data-id*="ticketnumber"] input"#),
            Field::SubjectSearchButton => Target::new("Subject lookup button")
                .or(r#"[aria-label="Search records for Subject, Lookup field"]"#)
                .or(r#"[aria-label="Search records for Subject, Lookup"]"#)
                .or(r#"[data-id*="subject"] button[aria-label*="Search"]"#)
                .or(r#"button[data-id*="subject"][title*="Search"]"#),
            Field::SubjectInput => Target::new("Subject input")
                .or(r#"input[aria-label="Look for subject"]"#)
                .or(r#"input[aria-label*="Subject"]"#)
                .or(r#"[data-id*="subject"] input"#)
                .or(r#"input[placeholder*="Subject"]"#),
            Field::CustomerSearchButton => Target::new("Customer lookup button")
                .or(r#"[aria-label="Search records for Customer, Lookup field"]"#)
                .or(r#"[aria-label="Search records for Customer, Lookup"]"#)
                .or(r#"[data-id="customerid.fieldControl-LookupResultsDropdown_customerid_search"]"#)
                .or(r#"button[data-id*="customerid"][aria-label*="Search"]"#)
                .or(r#"[data-id*="customer"] button[title="Search"]"#),
            Field::CustomerInput => Target::new("Customer input")
                .or(r#"input[aria-label="Customer, Lookup"]"#)
                .or(r#"input[aria-label*="Customer"]"#)
                .or(r#"[data-id*="customer"] input"#),
            Field::OriginField => Target::new("Origin field")
                .or(r#"select[aria-label="Origin"]"#)
                .or(r#"button[aria-label="Origin"]"#)
                .or(r#"[aria-label="Origin"]"#)
                .or(r#"[data-id*="origin"] select"#)
                .or(r#"[data-id*="origin"] button"#),
            Field::Description => Target::new("Description")
                .or(r#"textarea[aria-label="Description"]"#)
                .or(r#"[aria-label="Description"]"#)
                .or(r#"[data-id*="description"] textarea"#),
            Field::SaveButton => Target::new("Save button")
                .or(r#"button[aria-label="Save (CTRL+S)"]"#)
                .or(r#"button[aria-label="Save"]"#)
                .or(r#"button[title="Save"]"#)
                .or(r#"[data-id="save"]"#)
                .or_many(r#"button:has-text("Save")"#)
                .filtered(ElementFilter::new().require("save").exclude("close").exclude("&")),
            Field::SaveAndCloseButton => Target::new("Save & Close button")
                .or(r#"button[aria-label="Save & Close"]"#)
                .or(r#"[aria-label="Save and Close"]"#)
                .or(r#"button[title*="Save & Close"]"#)
                .or(r#"button:has-text("Save & Close")"#),
            Field::FormErrorOk => Target::new("Error dialog OK")
                .or(r#"button[title="OK"]"#)
                .or(r#"[role="dialog"] button:has-text("OK")"#),
            Field::FormErrorMessage => Target::new("Error dialog message")
                .or(r#"div[role="dialog"] span[data-id]"#)
                .or(r#"[role="alertdialog"] [id^="subtitle"]"#),

            Field::OpenListOptions => Target::new("Open list options")
                .or_many(r#"[role="listbox"] [role="option"]"#)
                .or_many(r#"[role="listbox"] [data-list-index]"#)
                .or_many(r#"[aria-expanded="true"] [role="option"]"#)
                .or_many(r#".ms-Suggestions [data-list-index]"#)
                .or_many(r#".ms-ComboBox-optionsContainer [role="option"]"#)
                .or_many("option")
                .select(SelectionPolicy::All),
            Field::LookupDialog => Target::new("Lookup dialog")
                .or(r#"[role="dialog"][aria-label*="Lookup"]"#)
                .or(r#"[role="dialog"]"#)
                .or(".ms-Dialog")
                .or(".ms-Modal"),
            Field::LookupAdvancedLink => Target::new("Advanced lookup link")
                .or(r#"a:has-text("Advanced")"#)
                .or(r#"button:has-text("Advanced")"#)
                .or(r#"[aria-label*="Advanced lookup"]"#),
            Field::LookupRecordRows => Target::new("Lookup record rows")
                .or_many(r#"input[type="checkbox"][aria-label="select or deselect the row"]"#)
                .or_many(r#"input[type="radio"]"#)
                .or_many(r#"[role="radio"]"#)
                .or_many(r#"[role="row"] [role="gridcell"]:first-child"#)
                .or_many("tbody tr")
                .within(dialog_scope())
                .select(SelectionPolicy::Random { among: None }),
            Field::LookupDone => Target::new("Lookup confirm")
                .or(r#"button:has-text("Done")"#)
                .or(r#"button:has-text("Add")"#)
                .or(r#"button:has-text("Select")"#)
                .or(r#"button:has-text("OK")"#)
                .or(r#"[aria-label*="Done"]"#)
                .within(dialog_scope()),

            Field::MoreCommands => Target::new("More commands")
                .or(r#"button[aria-label="More commands for Case"]"#)
                .or(r#"button[aria-label*="More commands"]"#)
                .or(r#"button[title="More commands"]"#),
            Field::ResolveCaseButton => Target::new("Resolve Case button")
                .or(r#"button[aria-label="Resolve Case"]"#)
                .or(r#"[role="menuitem"][aria-label="Resolve Case"]"#)
                .or(r#"button:has-text("Resolve Case")"#),
            Field::ResolutionField => Target::new("Resolution")
                .or(r#"input[aria-label="Resolution"]"#)
                .or(r#"textarea[aria-label*="Resolution"]"#)
                .or(r#"input[aria-label*="Resolution"]"#)
                .or("textarea")
                .within(dialog_scope()),
            Field::ResolveConfirm => Target::new("Resolve confirm")
                .or(r#"button[data-id="ok_id"]"#)
                .or(r#"[role="dialog"] button:has-text("Resolve")"#)
                .or(r#"button[aria-label="Resolve"]"#)
                .filtered(ElementFilter::new().exclude("cancel")),
            Field::ResolveDialog => Target::new("Resolve dialog")
                .or(r#"[role="dialog"]:has-text("Resolve Case")"#)
                .or(r#"[role="dialog"] [aria-label*="Resolution"]"#),
            Field::DeleteButton => Target::new("Delete button")
                .or(r#"button[aria-label="Delete"]"#)
                .or(r#"[role="menuitem"][aria-label="Delete"]"#)
                .or(r#"button:has-text("Delete")"#),
            Field::DeleteConfirm => Target::new("Delete confirm")
                .or(r#"button[data-id="confirmButton"]"#)
                .or(r#"[role="dialog"] button:has-text("Delete")"#),

            Field::ResolvedLabel => Target::new("Resolved status")
                .or("text=Resolved")
                .or(r#"[title="Resolved"]"#)
                .or(r#"[aria-label="Resolved"]"#),
            Field::SuccessBanner => Target::new("Success banner")
                .or(".ms-MessageBar--success")
                .or(r#"span[data-id="warningNotification"]"#)
                .or(r#"[role="status"]:has-text("resolved")"#),
            Field::StatusField => Target::new("Status")
                .or(r#"[data-id="header_statecode"] [aria-label="Status"]"#)
                .or(r#"select[aria-label="Status"]"#)
                .or(r#"[aria-label="Status Reason"]"#)
                .or(r#"[aria-label="Status"]"#),

            Field::LoginEmail => Target::new("Sign-in email")
                .or(r#"input[name="loginfmt"]"#)
                .or(r#"input[type="email"]"#),
            Field::LoginNext => Target::new("Sign-in next").or("#idSIButton9"),
            Field::LoginPassword => Target::new("Sign-in password")
                .or(r#"input[name="passwd"]"#)
                .or(r#"input[type="password"]"#),
            Field::StaySignedInYes => Target::new("Stay signed in")
                .or("#idSIButton9")
                .or(r#"input[value="Yes"]"#),
            Field::LoggedInIndicator => Target::new("Signed-in account")
                .or(r#"[data-id="mectrl_main_trigger"]"#)
                .or(r#"#mectrl_main_trigger"#)
                .or(r#"[aria-label*="Account manager"]"#),

            Field::ModalCloseButtons => Target::new("Modal close buttons")
                .or_many(r#"[id^="modalDialogRoot_"] button[data-id="dialogCloseIconButton"]"#)
                .or_many(r#"button[data-id="dialogCloseIconButton"]"#)
                .filtered(ElementFilter::dismiss_safe().without_attr("data-lp-id"))
                .select(SelectionPolicy::All),
            Field::AssistantDismissButtons => Target::new("Assistant dismiss buttons")
                .or_many(r#"[aria-label="Dismiss Copilot suggestion"]"#)
                .or_many(r#".fui-TeachingPopover button:has-text("Got it")"#)
                .or_many(r#".fui-TeachingPopover button:has-text("No thanks")"#)
                .or_many(r#".fui-TeachingPopover button:has-text("Skip")"#)
                .or_many(r#".fui-TeachingPopover button:has-text("Maybe later")"#)
                .or_many(r#"button:has-text("Got it")"#)
                .or_many(r#"button:has-text("No thanks")"#)
                .or_many(r#"button:has-text("Maybe later")"#)
                .or_many(r#"button:has-text("Not now")"#)
                .or_many(r#"button:has-text("Don't allow")"#)
                .or_many(r#"button:has-text("Block")"#)
                .or_many(r#"[role="dialog"] button[aria-label*="Dismiss"]"#)
                .or_many(r#"[data-testid*="dismiss"]"#)
                // Notification and callout containers only; a bare Close or
                // Cancel elsewhere may belong to the form.
                .or_many(r#".ms-Callout button[aria-label="Close"]"#)
                .or_many(r#".ms-Callout button:has-text("Cancel")"#)
                .or_many(r#"[data-id="notificationWrapper"] button[aria-label="Close"]"#)
                .or_many(r#"[data-id="notificationWrapper"] button:has-text("Cancel")"#)
                .filtered(ElementFilter::dismiss_safe().without_attr("data-lp-id"))
                .select(SelectionPolicy::All),
        }
    }
}

/// Link to a case in the results grid by exact title.
pub fn case_link(title: &str) -> Target {
    let quoted = css_quote(title);
    Target::new(format!("Case link '{}'", title))
        .or(&format!(r#"div[col-id="title"] a[role="link"][aria-label={}]"#, quoted))
        .or(&format!(r#"a[role="link"][aria-label={}]"#, quoted))
        .or(&format!(r#"[title={}]"#, quoted))
        .candidate(crate::resolve::LocatorCandidate::new(Locator::text(title)))
}

/// Option in an open list whose text is `text`.
pub fn list_option(text: &str) -> Target {
    Target::new(format!("Option '{}'", text))
        .candidate(crate::resolve::LocatorCandidate::new(Locator::role(
            "option", text,
        )))
        .candidate(crate::resolve::LocatorCandidate::new(Locator::has_text(
            r#"[role="listbox"] [role="option"]"#,
            text,
        )))
}

/// Quote a value for use inside a CSS attribute selector.
pub fn css_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
