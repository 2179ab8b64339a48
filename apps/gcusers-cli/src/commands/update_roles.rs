//! Revoke and grant roles on the selected users

use gcusers_engine::{
    BulkBatcher, BulkRoleUpdatePlan, DivisionDirectory, RoleDirectory, RoleUpdateRequest,
    RoleUpdateTally,
};
use serde_json::Value;
use tracing::{debug, info};

use super::ActionContext;
use crate::error::CliResult;

pub async fn execute(
    context: &ActionContext<'_>,
    users: &[Value],
    request: &RoleUpdateRequest,
) -> CliResult<RoleUpdateTally> {
    let verify = context.config().verify;

    let roles = RoleDirectory::load(&context.aggregator, &request.role_names()).await?;
    roles.verify(request.remove(), verify, "remove")?;
    let grants: Vec<String> = request.add().iter().map(|g| g.role.clone()).collect();
    roles.verify(&grants, verify, "add")?;

    let divisions = DivisionDirectory::load(&context.aggregator).await?;
    debug!(home = ?divisions.home_division_id(), "Divisions loaded");

    let plan = BulkRoleUpdatePlan::build(users, request, &roles, &divisions);
    let batcher = BulkBatcher::new(context.executor.clone(), context.config());
    let tally = batcher.apply_role_plan(plan, users.len()).await?;

    info!(
        input = tally.input,
        revoke_calls = tally.revoke_calls,
        grant_calls = tally.grant_calls,
        "Role update completed"
    );
    Ok(tally)
}
