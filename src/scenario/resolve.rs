//! Resolve an existing case and confirm it left the active view.

use super::{navigate, Journey, WorkflowRecorder};
use crate::interact::{EntryMode, Outcome, PostCondition, ValueMatch};
use crate::targets::Field;
use crate::validate::ExpectedOutcome;
use crate::Result;
use tracing::{debug, info, warn};

pub async fn run(j: &Journey, rec: &mut WorkflowRecorder) -> Result<()> {
    let title = navigate::locate_existing(j).await?;
    rec.entity(&title);
    navigate::open_case(j, &title).await?;
    rec.pass("open case", title.clone());

    open_resolve_dialog(j).await.into_result("open resolve dialog")?;
    rec.pass("resolve dialog", "opened");
    j.clear().await;

    let entered = enter_resolution(j, &j.config.data.resolution_text).await;
    rec.outcome("resolution text", &entered);
    j.clear().await;

    let confirmed = j
        .executor
        .click_target(
            &Field::ResolveConfirm.target(),
            &PostCondition::Disappears(Field::ResolveDialog.target()),
        )
        .await;
    rec.outcome("confirm resolve", &confirmed);
    j.settle().await;

    if let Some(message) = j.take_form_error().await {
        rec.fail("resolve accepted", message);
        return Ok(());
    }
    j.clear().await;

    let verdict = j.validator.confirm(&ExpectedOutcome::RecordResolved).await;
    if !rec.verdict("case resolved", &verdict) {
        return Ok(());
    }

    match j.fixtures.delete_by_title(&title) {
        Ok(n) => debug!("dropped {} fixture record(s) for '{}'", n, title),
        Err(e) => warn!("Could not drop fixture '{}': {}", title, e),
    }

    navigate::open_case_list(j).await?;
    navigate::search_cases(j, &title).await?;
    let absent = j
        .validator
        .confirm(&ExpectedOutcome::RecordAbsent { title: title.clone() })
        .await;
    rec.verdict("left active cases", &absent);
    Ok(())
}

/// The command bar shows Resolve Case directly or under More commands.
async fn open_resolve_dialog(j: &Journey) -> Outcome {
    let field = Field::ResolutionField.target();
    let direct = j
        .executor
        .click_target(&Field::ResolveCaseButton.target(), &PostCondition::Appears(field.clone()))
        .await;
    if direct.is_success() {
        return direct;
    }

    info!("Resolve Case not on the command bar, trying More commands");
    let menu = j
        .executor
        .click_target(
            &Field::MoreCommands.target(),
            &PostCondition::Appears(Field::ResolveCaseButton.target()),
        )
        .await;
    if let Outcome::Failure { attempted } = menu {
        let mut all = match direct {
            Outcome::Failure { attempted } => attempted,
            Outcome::Success { .. } => Vec::new(),
        };
        all.extend(attempted.into_iter().map(|a| format!("more commands:{}", a)));
        return Outcome::Failure { attempted: all };
    }
    j.executor
        .click_target(&Field::ResolveCaseButton.target(), &PostCondition::Appears(field))
        .await
}

async fn enter_resolution(j: &Journey, text: &str) -> Outcome {
    let field = match j.resolver.resolve(&Field::ResolutionField.target()).await {
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
