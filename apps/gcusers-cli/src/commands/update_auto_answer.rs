//! Update ACD auto-answer on the selected users

use gcusers_engine::{AttributeToggle, BulkBatcher, ToggleTally};
use serde_json::Value;
use tracing::info;

use super::ActionContext;
use crate::error::CliResult;

pub async fn execute(
    context: &ActionContext<'_>,
    users: &[Value],
    toggle: AttributeToggle,
) -> CliResult<ToggleTally> {
    let batcher = BulkBatcher::new(context.executor.clone(), context.config());
    let tally = batcher.toggle_auto_answer(users, toggle).await?;

    info!(
        input = tally.input,
        deleted = tally.deleted,
        already_set = tally.already_set,
        updated = tally.updated,
        "ACD auto-answer update completed"
    );
    Ok(tally)
}
