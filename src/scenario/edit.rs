//! Edit description and origin of an existing case, then verify on reopen.

use super::{navigate, Journey, WorkflowRecorder};
use crate::config::EditValidation;
use crate::interact::{EntryMode, OptionChoice, Outcome, PostCondition, ValueMatch};
use crate::targets::Field;
use crate::validate::ExpectedOutcome;
use crate::Result;
use tracing::{info, warn};

/// Shown for an origin field with no value.
const UNKNOWN_ORIGIN: &str = "Unknown";

pub async fn run(j: &Journey, rec: &mut WorkflowRecorder) -> Result<()> {
    let title = navigate::locate_existing(j).await?;
    rec.entity(&title);
    navigate::open_case(j, &title).await?;
    rec.pass("open case", title.clone());

    let original_origin = j
        .read_field(Field::OriginField)
        .await
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string());
    info!("Current origin: {}", original_origin);

    let description = &j.config.data.edit_description;
    let described = set_description(j, description).await;
    rec.outcome("description", &described);
    j.clear().await;

    let new_origin = change_origin(j, &original_origin).await;
    rec.check(
        "origin changed",
        new_origin.is_some(),
        format!(
            "{} -> {}",
            original_origin,
            new_origin.as_deref().unwrap_or("(none)")
        ),
    );
    j.clear().await;

    let saved = j
        .executor
        .click_target(
            &Field::SaveAndCloseButton.target(),
            &PostCondition::Disappears(Field::CaseTitle.target()),
        )
        .await;
    rec.outcome("save and close", &saved);
    j.settle().await;
    if let Some(message) = j.take_form_error().await {
        rec.fail("save accepted", message);
        return Ok(());
    }
    j.clear().await;

    let reopened = match navigate::open_case_list(j).await {
        Ok(()) => navigate::open_case(j, &title).await,
        Err(e) => Err(e),
    };
    if let Err(e) = reopened {
        match j.config.policy.edit_validation {
            EditValidation::Strict => {
                rec.fail("changes persisted", format!("inconclusive, could not reopen: {}", e))
            }
            EditValidation::Lenient => {
                warn!("Could not reopen '{}', assuming the edit stuck", title);
                rec.pass("changes persisted", format!("assumed, could not reopen: {}", e))
            }
        }
        return Ok(());
    }

    let mut fields = vec![(Field::Description.target(), description.clone())];
    if let Some(ref origin) = new_origin {
        fields.push((Field::OriginField.target(), origin.clone()));
    }
    let verdict = j
        .validator
        .confirm(&ExpectedOutcome::FieldsPersisted { fields })
        .await;
    rec.verdict("changes persisted", &verdict);

    let origin_now = j.read_field(Field::OriginField).await.unwrap_or_default();
    rec.check(
        "origin differs from original",
        !origin_now.trim().eq_ignore_ascii_case(&original_origin),
        format!("was {}, now {}", original_origin, origin_now.trim()),
    );
    Ok(())
}

async fn set_description(j: &Journey, text: &str) -> Outcome {
    let field = match j.resolver.resolve(&Field::Description.target()).await {
        Ok(res) => res.into_first(),
        Err(_) => None,
    };
    match field {
        Some(field) => {
            j.executor
                .enter_text(&field, text, &[EntryMode::Fill, j.executor.typed()], ValueMatch::Exact)
                .await
        }
        None => Outcome::Failure {
            attempted: vec!["resolve".into()],
        },
    }
}

/// Pick any origin but the current one. `None` when nothing else was chosen.
async fn change_origin(j: &Journey, current: &str) -> Option<String> {
    let field = j
        .resolver
        .resolve(&Field::OriginField.target())
        .await
        .ok()?
        .into_first()?;
    let choice = OptionChoice::DifferentFrom {
        current: current.to_string(),
        preferred: j.config.data.preferred_origins.clone(),
    };
    let picked = j.executor.choose_in_dropdown(&field, &choice).await;
    if !picked.is_success() {
        warn!("No origin other than '{}' among {:?}", current, picked.seen);
    }
    picked.chosen
}
