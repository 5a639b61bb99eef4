//! Delete an existing case through the UI and drop its fixture.

use super::{navigate, Journey, WorkflowRecorder};
use crate::interact::{Outcome, PostCondition};
use crate::targets::Field;
use crate::validate::ExpectedOutcome;
use crate::Result;
use tracing::{debug, info};

pub async fn run(j: &Journey, rec: &mut WorkflowRecorder) -> Result<()> {
    let title = navigate::locate_existing(j).await?;
    rec.entity(&title);
    navigate::open_case(j, &title).await?;
    rec.pass("open case", title.clone());

    open_delete_confirmation(j).await.into_result("open delete confirmation")?;
    let confirmed = j
        .executor
        .click_target(
            &Field::DeleteConfirm.target(),
            &PostCondition::Disappears(Field::DeleteConfirm.target()),
        )
        .await;
    if !rec.outcome("confirm delete", &confirmed) {
        return Ok(());
    }
    j.settle().await;
    j.clear().await;
    info!("Deleted case '{}'", title);

    match j.fixtures.delete_by_title(&title) {
        Ok(n) => rec.pass("fixture removed", format!("{} record(s)", n)),
        Err(e) => rec.fail("fixture removed", e.to_string()),
    }

    navigate::open_case_list(j).await?;
    navigate::search_cases(j, &title).await?;
    let absent = j
        .validator
        .confirm(&ExpectedOutcome::RecordAbsent { title })
        .await;
    rec.verdict("case gone", &absent);
    Ok(())
}

async fn open_delete_confirmation(j: &Journey) -> Outcome {
    let confirm = Field::DeleteConfirm.target();
    let direct = j
        .executor
        .click_target(&Field::DeleteButton.target(), &PostCondition::Appears(confirm.clone()))
        .await;
    if direct.is_success() {
        return direct;
    }
    debug!("Delete not on the command bar, opening More commands");
    let menu = j
        .executor
        .click_target(
            &Field::MoreCommands.target(),
            &PostCondition::Appears(Field::DeleteButton.target()),
        )
        .await;
    if !menu.is_success() {
        return menu;
    }
    j.executor
        .click_target(&Field::DeleteButton.target(), &PostCondition::Appears(confirm))
        .await
}
