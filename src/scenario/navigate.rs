//! Getting to the case list, the create form, and individual cases.

use super::Journey;
use crate::interact::{EntryMode, PostCondition, ValueMatch};
use crate::targets::{case_link, Field};
use crate::{Error, Result};
use tracing::{debug, info, warn};

/// Fixture titles tried before falling back to whatever the list shows.
const MAX_FIXTURE_PROBES: usize = 5;

/// Open the active cases view, by site map first and by URL second.
pub async fn open_case_list(j: &Journey) -> Result<()> {
    j.clear().await;
    if via_site_map(j).await && list_visible(j).await {
        info!("Opened cases list from the site map");
        return Ok(());
    }

    let url = format!("{}/main.aspx?etn=incident&pagetype=entitylist", j.base());
    warn!("Site map navigation failed, opening {}", url);
    j.driver.goto(&url).await?;
    j.settle().await;
    j.clear().await;
    if list_visible(j).await {
        Ok(())
    } else {
        Err(Error::Structural("cases list did not open".into()))
    }
}

async fn via_site_map(j: &Journey) -> bool {
    let nav = Field::CasesNavItem.target();
    if !j.resolver.is_visible(&nav).await {
        debug!("Cases entry hidden, expanding Service area");
        let expanded = j
            .executor
            .click_target(&Field::ServiceArea.target(), &PostCondition::Appears(nav.clone()))
            .await;
        if !expanded.is_success() {
            return false;
        }
    }
    j.executor
        .click_target(&nav, &PostCondition::Appears(Field::CasesListView.target()))
        .await
        .is_success()
}

async fn list_visible(j: &Journey) -> bool {
    j.resolver
        .wait_visible(&Field::CasesListView.target(), j.config.timeouts.widget_ms)
        .await
        .is_some()
}

/// Open an empty create form from the list.
pub async fn open_create_form(j: &Journey) -> Result<()> {
    j.clear().await;
    let title = Field::CaseTitle.target();
    let clicked = j
        .executor
        .click_target(&Field::NewCaseButton.target(), &PostCondition::Appears(title.clone()))
        .await;
    if clicked.is_success() {
        info!("Opened new case form");
        return Ok(());
    }

    let url = format!("{}/main.aspx?etn=incident&pagetype=entityrecord", j.base());
    warn!("New Case button failed, opening {}", url);
    j.driver.goto(&url).await?;
    j.settle().await;
    j.clear().await;
    if j.resolver.wait_visible(&title, j.config.timeouts.widget_ms).await.is_some() {
        Ok(())
    } else {
        Err(Error::Structural("create form did not open".into()))
    }
}

/// Filter the current view by `title`.
pub async fn search_cases(j: &Journey, title: &str) -> Result<()> {
    j.clear().await;
    let search = j
        .resolver
        .resolve(&Field::ViewSearchBox.target())
        .await?
        .required()?;
    j.executor
        .enter_text(&search, title, &[EntryMode::Fill, j.executor.typed()], ValueMatch::Exact)
        .await
        .into_result("search cases")?;
    j.driver.press_key("Enter").await?;
    j.settle().await;
    debug!("Searched view for '{}'", title);
    Ok(())
}

/// Search for `title` and open it.
pub async fn open_case(j: &Journey, title: &str) -> Result<()> {
    search_cases(j, title).await?;
    j.executor
        .click_target(&case_link(title), &PostCondition::Appears(Field::CaseTitle.target()))
        .await
        .into_result(&format!("open case '{}'", title))?;
    j.settle().await;
    j.clear().await;
    info!("Opened case '{}'", title);
    Ok(())
}

/// Pick an existing active case to work on and leave the list showing it.
///
/// Fixture titles from the configured category come first, in random
/// order; after that, the first listed case that looks like ours.
pub async fn locate_existing(j: &Journey) -> Result<String> {
    let category = &j.config.data.subject_category;
    let mut titles = match j.fixtures.titles(category) {
        Ok(titles) => titles,
        Err(e) => {
            warn!("Fixture store unreadable: {}", e);
            Vec::new()
        }
    };
    if let Some(start) = j.rng.index(titles.len()) {
        titles.rotate_left(start);
    }

    open_case_list(j).await?;
    for title in titles.iter().take(MAX_FIXTURE_PROBES) {
        search_cases(j, title).await?;
        if j.resolver.is_visible(&case_link(title)).await {
            info!("Using fixture case '{}'", title);
            return Ok(title.clone());
        }
        debug!("Fixture case '{}' is not in the active view", title);
    }

    // Reload the view so no filter is left from the probes above.
    open_case_list(j).await?;
    let rows = j
        .resolver
        .with_budget(j.config.timeouts.widget_ms)
        .resolve(&Field::CaseRowLinks.target())
        .await?
        .into_all();
    let prefix = &j.config.data.title_prefix;
    rows.iter()
        .map(|row| row.label().trim().to_string())
        .find(|label| label.starts_with(prefix.as_str()) || label.starts_with("Case-"))
        .inspect(|title| info!("Using listed case '{}'", title))
        .ok_or_else(|| Error::Structural("no existing case to work on".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{FakeDriver, FakeElement};
    use crate::fixtures::CaseRecord;
    use crate::scenario::testing;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn falls_back_to_direct_url() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new();
        driver.on_goto("pagetype=entitylist", |p| {
            p.add(FakeElement::new("#hdr").text("Active Cases"));
        });
        let j = testing::journey(&driver, &testing::config(&dir.path().join("f.json")));
        open_case_list(&j).await.unwrap();
        assert_eq!(
            driver.log().last().map(String::as_str),
            Some("goto:https://org.crm.dynamics.com/main.aspx?etn=incident&pagetype=entitylist")
        );
    }

    #[tokio::test]
    async fn unreachable_list_is_structural() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new();
        let j = testing::journey(&driver, &testing::config(&dir.path().join("f.json")));
        let err = open_case_list(&j).await.unwrap_err();
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn stale_fixtures_fall_back_to_listed_case() {
        let dir = tempfile::tempdir().unwrap();
        let config = testing::config(&dir.path().join("f.json"));
        let driver = FakeDriver::new();
        testing::shell(&driver, Arc::new(Mutex::new(vec![])));
        driver.on_click("#nav-cases", |p| {
            p.set_visible("#list-header", true);
            p.set_visible("#search", true);
            p.add(
                FakeElement::new("#listed-0")
                    .tag("a")
                    .attr("aria-label", "Printer jam")
                    .matching(r#"div[col-id="title"] a[role="link"]"#),
            );
            p.add(
                FakeElement::new("#listed-1")
                    .tag("a")
                    .attr("aria-label", "AutoCase_LISTED")
                    .matching(r#"div[col-id="title"] a[role="link"]"#),
            );
        });
        let j = testing::journey(&driver, &config);
        j.fixtures
            .append("Query", CaseRecord::new("AutoCase_GONE", ""))
            .unwrap();

        let title = locate_existing(&j).await.unwrap();
        assert_eq!(title, "AutoCase_LISTED");
        assert_eq!(driver.count("fill:#search=AutoCase_GONE"), 1);
    }

    #[tokio::test]
    async fn nothing_to_work_on_is_structural() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new();
        testing::shell(&driver, Arc::new(Mutex::new(vec![])));
        let j = testing::journey(&driver, &testing::config(&dir.path().join("f.json")));
        let err = locate_existing(&j).await.unwrap_err();
        assert!(err.is_structural());
    }
}
