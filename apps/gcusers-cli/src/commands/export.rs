//! Export the selected users, with optional profile extension

use gcusers_engine::{ProfileOptions, ProfileResolver};
use serde_json::Value;

use super::ActionContext;
use crate::error::CliResult;
use crate::export::{export_users, DefaultTransform, ExportOptions, ExportSummary};

pub async fn execute(
    context: &ActionContext<'_>,
    users: Vec<Value>,
    options: &ExportOptions,
    profile: &ProfileOptions,
) -> CliResult<ExportSummary> {
    let selection = &context.run.selection;
    let resolver = ProfileResolver::new(
        context.aggregator.clone(),
        context.config(),
        selection.pagination,
        selection.group_method,
    );
    let users = resolver.extend(users, profile).await?;

    export_users(&users, options, &DefaultTransform)
}
