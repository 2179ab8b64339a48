//! Bulk mutation batcher.
//!
//! Writes go out in windows of at most `bulk_size` ids. A failed write
//! aborts the rest of the run; the executor's own retries are the only
//! retries.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{debug, info, instrument};

use crate::aggregate::entity_id;
use crate::roles::BulkRoleUpdatePlan;
use crate::transport::ApiRequest;
use crate::{EngineConfig, EngineError, EngineResult, RequestExecutor, Verbosity};

/// Target value of the ACD auto-answer flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeToggle {
    pub value: bool,
    /// Write even when the user already has the target value.
    pub force: bool,
}

impl FromStr for AttributeToggle {
    type Err = EngineError;

    /// Parses `true`, `false`, `forceTrue` or `forceFalse`, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, force) = match s.trim().to_lowercase().as_str() {
            "true" => (true, false),
            "false" => (false, false),
            "forcetrue" => (true, true),
            "forcefalse" => (false, true),
            other => {
                return Err(EngineError::Config(format!(
                    "Invalid auto-answer value '{other}', expected true, false, forceTrue or forceFalse"
                )))
            }
        };
        Ok(Self { value, force })
    }
}

/// Outcome of an attribute toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleTally {
    pub input: usize,
    pub deleted: usize,
    pub already_set: usize,
    pub updated: usize,
}

/// Outcome of a role update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdateTally {
    pub input: usize,
    pub revoke_calls: usize,
    pub grant_calls: usize,
}

/// Issues bulk writes through the executor.
#[derive(Debug, Clone)]
pub struct BulkBatcher {
    executor: RequestExecutor,
    bulk_size: usize,
    verbosity: Verbosity,
}

impl BulkBatcher {
    pub fn new(executor: RequestExecutor, config: &EngineConfig) -> Self {
        Self {
            executor,
            bulk_size: config.bulk_size.max(1),
            verbosity: config.verbosity,
        }
    }

    /// Sets `acdAutoAnswer` on every non-deleted user that needs it.
    ///
    /// # Errors
    ///
    /// An empty selection is an [`EngineError::EmptySelection`]; a failed
    /// flush aborts the run.
    #[instrument(skip(self, selected), fields(users = selected.len(), value = toggle.value, force = toggle.force))]
    pub async fn toggle_auto_answer(
        &self,
        selected: &[Value],
        toggle: AttributeToggle,
    ) -> EngineResult<ToggleTally> {
        if selected.is_empty() {
            return Err(EngineError::EmptySelection(
                "no users to update".to_string(),
            ));
        }

        let mut tally = ToggleTally {
            input: selected.len(),
            ..ToggleTally::default()
        };
        let mut pending: Vec<Value> = Vec::with_capacity(self.bulk_size);

        for user in selected {
            if user.get("state").and_then(Value::as_str) == Some("deleted") {
                tally.deleted += 1;
                continue;
            }
            let current = user.get("acdAutoAnswer").and_then(Value::as_bool);
            if !toggle.force && current == Some(toggle.value) {
                tally.already_set += 1;
                continue;
            }
            let Some(id) = entity_id(user) else {
                continue;
            };

            pending.push(json!({ "id": id, "acdAutoAnswer": toggle.value }));
            tally.updated += 1;
            if pending.len() >= self.bulk_size {
                self.flush_auto_answer(std::mem::take(&mut pending)).await?;
            }
        }
        if !pending.is_empty() {
            self.flush_auto_answer(pending).await?;
        }

        if self.verbosity.log_details() {
            debug!(?tally, "Auto-answer change details");
        }
        Ok(tally)
    }

    async fn flush_auto_answer(&self, batch: Vec<Value>) -> EngineResult<()> {
        debug!(size = batch.len(), "Flushing auto-answer batch");
        self.executor
            .execute(&ApiRequest::patch("/api/v2/users/bulk").json(Value::Array(batch)))
            .await?;
        Ok(())
    }

    /// Applies a role plan: every revoke first, then explicit-division grants,
    /// then own-division grants.
    ///
    /// # Errors
    ///
    /// The first failed call aborts the run.
    #[instrument(skip(self, plan), fields(revokes = plan.revokes.len(), grants = plan.grants.len()))]
    pub async fn apply_role_plan(
        &self,
        plan: BulkRoleUpdatePlan,
        input: usize,
    ) -> EngineResult<RoleUpdateTally> {
        let mut tally = RoleUpdateTally {
            input,
            ..RoleUpdateTally::default()
        };

        for revoke in &plan.revokes {
            for window in revoke.user_ids.chunks(self.bulk_size) {
                let request = ApiRequest::put(format!(
                    "/api/v2/authorization/roles/{}/users/remove",
                    revoke.role_id
                ))
                .json(json!(window));
                self.executor.execute(&request).await?;
                tally.revoke_calls += 1;
            }
            info!(role = %revoke.role_name, users = revoke.user_ids.len(), "Role revoked");
        }

        for grant in &plan.grants {
            if !grant.divisions.is_empty() {
                tally.grant_calls += self
                    .grant_windows(&grant.role_id, &grant.user_ids, &grant.divisions)
                    .await?;
            }
            for (division_id, user_ids) in &grant.own_divisions {
                tally.grant_calls += self
                    .grant_windows(&grant.role_id, user_ids, std::slice::from_ref(division_id))
                    .await?;
            }
            info!(role = %grant.role_name, users = grant.user_ids.len(), "Role granted");
        }

        if self.verbosity.log_details() {
            debug!(?tally, "Role update details");
        }
        Ok(tally)
    }

    async fn grant_windows(
        &self,
        role_id: &str,
        user_ids: &[String],
        division_ids: &[String],
    ) -> EngineResult<usize> {
        let mut calls = 0;
        for window in user_ids.chunks(self.bulk_size) {
            let request = ApiRequest::post(format!("/api/v2/authorization/roles/{role_id}"))
                .query("subjectType", "PC_USER")
                .json(json!({
                    "subjectIds": window,
                    "divisionIds": division_ids,
                }));
            self.executor.execute(&request).await?;
            calls += 1;
        }
        Ok(calls)
    }
}
