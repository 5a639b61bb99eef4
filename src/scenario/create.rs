//! Create a case with its mandatory fields and confirm it is listed.

use super::{navigate, Journey, WorkflowRecorder};
use crate::fixtures::CaseRecord;
use crate::interact::{EntryMode, OptionChoice, Outcome, PostCondition, ValueMatch, BUTTON_CHAIN};
use crate::targets::Field;
use crate::validate::ExpectedOutcome;
use crate::{Error, Result};
use tracing::{debug, info, warn};

const TITLE_SUFFIX_LEN: usize = 6;

/// Subjects are picked among the first few entries only.
const SUBJECT_POOL: usize = 3;

pub async fn run(j: &Journey, rec: &mut WorkflowRecorder) -> Result<()> {
    navigate::open_case_list(j).await?;
    navigate::open_create_form(j).await?;
    rec.pass("create form", "case title field visible");

    let subject = select_subject(j).await;
    rec.outcome("subject", &subject);
    j.clear().await;

    let customer = select_customer(j).await;
    rec.outcome("customer", &customer);
    j.clear().await;

    let origin = select_origin(j).await;
    rec.outcome("origin", &origin);
    j.clear().await;

    let title = format!("{}{}", j.config.data.title_prefix, j.rng.letters(TITLE_SUFFIX_LEN));
    enter_title(j, &title).await?;
    rec.entity(&title);
    rec.pass("case title", title.clone());
    j.clear().await;

    if !j.config.data.description.is_empty() {
        let entered = enter_description(j, &j.config.data.description).await;
        rec.outcome("description", &entered);
        j.clear().await;
    }

    let saved = save(j).await;
    let mut accepted = rec.outcome("save", &saved);
    if let Some(message) = j.take_form_error().await {
        rec.fail("save accepted", message);
        accepted = false;
    } else if accepted {
        rec.pass("save accepted", "no error dialog");
    }
    // Only after the error check: a sweep may close an unprotected error dialog.
    j.clear().await;

    let number = j.read_field(Field::CaseNumber).await.unwrap_or_default();
    if number.trim().is_empty() {
        warn!("No case number shown after save");
    } else {
        info!("Created case {} '{}'", number, title);
        rec.case_number(&number);
    }

    let category = &j.config.data.subject_category;
    if accepted {
        match j.fixtures.append(category, CaseRecord::new(&title, &number)) {
            Ok(()) => rec.pass("fixture saved", format!("{} under {}", title, category)),
            Err(e) => rec.fail("fixture saved", e.to_string()),
        }
    } else {
        warn!("Not recording '{}' as a fixture", title);
    }

    navigate::open_case_list(j).await?;
    navigate::search_cases(j, &title).await?;
    let verdict = j
        .validator
        .confirm(&ExpectedOutcome::RecordCreated { title })
        .await;
    rec.verdict("case listed", &verdict);
    Ok(())
}

/// Lookup dialog first, then the dropdown under the subject input.
async fn select_subject(j: &Journey) -> Outcome {
    let mut attempted = Vec::new();
    if let Ok(res) = j.resolver.resolve(&Field::SubjectSearchButton.target()).await {
        if let Some(button) = res.first() {
            let opened = j.executor.open_lookup(button, &Field::LookupDialog.target()).await;
            if opened.is_success() {
                match pick_lookup_row(j).await {
                    Some(picked) => {
                        info!("Subject '{}' from lookup", picked);
                        return Outcome::Success {
                            strategy: "lookup".into(),
                            attempts: 1,
                        };
                    }
                    None => attempted.push("lookup".to_string()),
                }
            } else {
                attempted.push("lookup".to_string());
            }
        }
    }

    let input = match j.resolver.resolve(&Field::SubjectInput.target()).await {
        Ok(res) => res.into_first(),
        Err(_) => None,
    };
    let Some(input) = input else {
        attempted.push("dropdown".into());
        return Outcome::Failure { attempted };
    };
    let picked = j
        .executor
        .choose_in_dropdown(&input, &OptionChoice::Random { among: Some(SUBJECT_POOL) })
        .await;
    match picked.chosen {
        Some(ref chosen) if picked.is_success() => {
            info!("Subject '{}' from dropdown", chosen);
            Outcome::Success {
                strategy: "dropdown".into(),
                attempts: attempted.len() + 1,
            }
        }
        _ => {
            attempted.push("dropdown".into());
            Outcome::Failure { attempted }
        }
    }
}

/// Lookup icon and dialog first, then typing into the input.
async fn select_customer(j: &Journey) -> Outcome {
    let mut attempted = Vec::new();
    if let Ok(res) = j.resolver.resolve(&Field::CustomerSearchButton.target()).await {
        if let Some(button) = res.first() {
            let opened = j.executor.open_lookup(button, &Field::LookupDialog.target()).await;
            if opened.is_success() {
                if let Some(picked) = pick_lookup_row(j).await {
                    info!("Customer '{}' from lookup", picked);
                    return Outcome::Success {
                        strategy: "lookup".into(),
                        attempts: 1,
                    };
                }
            }
            attempted.push("lookup".to_string());
        }
    }

    let input = match j.resolver.resolve(&Field::CustomerInput.target()).await {
        Ok(res) => res.into_first(),
        Err(_) => None,
    };
    if let Some(input) = input {
        let typed = j
            .executor
            .enter_text(&input, "a", &[j.executor.typed()], ValueMatch::Contains)
            .await;
        if typed.is_success() {
            let picked = j
                .executor
                .select_option(&Field::OpenListOptions.target(), &OptionChoice::Random { among: None })
                .await;
            if picked.is_success() {
                return Outcome::Success {
                    strategy: "suggestion".into(),
                    attempts: attempted.len() + 1,
                };
            }
        }
    }
    attempted.push("suggestion".into());
    Outcome::Failure { attempted }
}

/// In an open lookup dialog: Advanced when offered, a random row, confirm.
async fn pick_lookup_row(j: &Journey) -> Option<String> {
    let widget = j.resolver.with_budget(j.config.timeouts.widget_ms);
    let rows_target = Field::LookupRecordRows.target();

    if let Ok(res) = widget.resolve(&Field::LookupAdvancedLink.target()).await {
        if let Some(link) = res.first() {
            let advanced = j
                .executor
                .click(link, BUTTON_CHAIN, &PostCondition::Appears(rows_target.clone()))
                .await;
            debug!("advanced lookup: {:?}", advanced);
        }
    }

    let row = widget.resolve(&rows_target).await.ok()?.into_first()?;
    let label = row.label().to_string();
    if !j
        .executor
        .click(&row, BUTTON_CHAIN, &PostCondition::None)
        .await
        .is_success()
    {
        return None;
    }

    let done = j
        .executor
        .click_target(
            &Field::LookupDone.target(),
            &PostCondition::Disappears(Field::LookupDialog.target()),
        )
        .await;
    if done.is_success() {
        Some(label)
    } else {
        warn!("Lookup dialog did not close");
        None
    }
}

async fn select_origin(j: &Journey) -> Outcome {
    let field = match j.resolver.resolve(&Field::OriginField.target()).await {
        Ok(res) => res.into_first(),
        Err(_) => None,
    };
    let Some(field) = field else {
        return Outcome::Failure {
            attempted: vec!["resolve".into()],
        };
    };
    let picked = j
        .executor
        .choose_in_dropdown(&field, &OptionChoice::Random { among: None })
        .await;
    if let Some(ref chosen) = picked.chosen {
        info!("Origin '{}'", chosen);
    }
    picked.outcome
}

/// The title is what later scenarios find the case by, so failing here
/// ends the scenario.
async fn enter_title(j: &Journey, title: &str) -> Result<()> {
    let field = j
        .resolver
        .resolve(&Field::CaseTitle.target())
        .await?
        .required()
        .map_err(|e| Error::Structural(format!("case title field: {}", e)))?;
    let entered = j
        .executor
        .enter_text(&field, title, &[EntryMode::Fill, j.executor.typed()], ValueMatch::Exact)
        .await;
    if entered.is_success() {
        Ok(())
    } else {
        Err(Error::Structural(format!("could not set case title '{}'", title)))
    }
}

async fn enter_description(j: &Journey, text: &str) -> Outcome {
    match j.resolver.resolve(&Field::Description.target()).await {
        Ok(res) => match res.into_first() {
            Some(field) => {
                j.executor
                    .enter_text(&field, text, &[EntryMode::Fill, j.executor.typed()], ValueMatch::Exact)
                    .await
            }
            None => Outcome::Failure {
                attempted: vec!["resolve".into()],
            },
        },
        Err(_) => Outcome::Failure {
            attempted: vec!["resolve".into()],
        },
    }
}

async fn save(j: &Journey) -> Outcome {
    let outcome = j
        .executor
        .click_target(&Field::SaveButton.target(), &PostCondition::None)
        .await;
    j.settle().await;
    outcome
}
