//! Profile extension resolver.
//!
//! Adds per-user supplemental data (queues, grants, adjacents, alert
//! timeout) and resolves the locations, groups and managers referenced by
//! the selection in one search per kind.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

use crate::aggregate::{entity_id, Aggregator, SearchCriterion};
use crate::pipeline::{IncludeFlags, ResolveTarget};
use crate::settings::{GroupSearchMethod, PaginationProtocol};
use crate::transport::ApiRequest;
use crate::{EngineConfig, EngineResult, RequestExecutor, VerifyInput};

/// Per-user supplemental fetches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtendedFlags {
    pub queues: bool,
    pub direct_reports: bool,
    pub managers: bool,
    pub phone_alert_timeouts: bool,
    pub roles_divisions: bool,
}

impl ExtendedFlags {
    fn any(&self) -> bool {
        self.queues
            || self.direct_reports
            || self.managers
            || self.phone_alert_timeouts
            || self.roles_divisions
    }

    fn adjacents(&self) -> bool {
        self.direct_reports || self.managers
    }
}

/// Foreign references resolved to names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveFlags {
    pub locations: bool,
    pub groups: bool,
    pub managers: bool,
}

/// What the resolver adds to each exported user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileOptions {
    pub extended: ExtendedFlags,
    pub resolve: ResolveFlags,
    pub include: IncludeFlags,
}

impl ProfileOptions {
    /// Locations are resolved only when they are also expanded.
    #[must_use]
    pub fn resolves_locations(&self) -> bool {
        self.include.locations && self.resolve.locations
    }

    /// Groups are resolved only when they are also expanded.
    #[must_use]
    pub fn resolves_groups(&self) -> bool {
        self.include.groups && self.resolve.groups
    }

    #[must_use]
    pub fn resolves_managers(&self) -> bool {
        self.resolve.managers
    }

    /// Whether any extension or resolve pass is requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.extended.any()
            || self.resolves_locations()
            || self.resolves_groups()
            || self.resolves_managers()
    }
}

/// Resolved entities by id.
type Resolved = HashMap<String, Value>;

/// Extends and resolves selected user records.
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    aggregator: Aggregator,
    executor: RequestExecutor,
    queue_page_size: u32,
    pagination: PaginationProtocol,
    group_method: GroupSearchMethod,
}

impl ProfileResolver {
    pub fn new(
        aggregator: Aggregator,
        config: &EngineConfig,
        pagination: PaginationProtocol,
        group_method: GroupSearchMethod,
    ) -> Self {
        let executor = aggregator.fetcher().executor().clone();
        Self {
            aggregator: aggregator.with_verify(VerifyInput::Off),
            executor,
            queue_page_size: config.queue_page_size,
            pagination,
            group_method,
        }
    }

    /// Consumes the selected records and returns the extended ones.
    ///
    /// Deleted users get no per-user fetches. Unresolvable references are
    /// filled with sentinel values.
    ///
    /// # Errors
    ///
    /// Any failed fetch aborts the run.
    #[instrument(skip(self, selected, options), fields(users = selected.len()))]
    pub async fn extend(
        &self,
        selected: Vec<Value>,
        options: &ProfileOptions,
    ) -> EngineResult<Vec<Value>> {
        if !options.is_requested() {
            info!("No extended profile requested");
            return Ok(selected);
        }
        info!(at = %chrono::Utc::now().to_rfc3339(), "Extending user profiles");

        let mut extended = Vec::with_capacity(selected.len());
        for user in selected {
            extended.push(self.extend_user(user, &options.extended).await?);
        }

        let locations = if options.resolves_locations() {
            self.resolve(ResolveTarget::Locations, location_ids(&extended)).await?
        } else {
            Resolved::new()
        };
        let groups = if options.resolves_groups() {
            self.resolve(ResolveTarget::Groups, group_ids(&extended)).await?
        } else {
            Resolved::new()
        };
        let managers = if options.resolves_managers() {
            self.resolve(ResolveTarget::Managers, manager_ids(&extended)).await?
        } else {
            Resolved::new()
        };

        let resolved = extended
            .into_iter()
            .map(|user| {
                let user = if options.resolves_locations() {
                    with_locations(user, &locations)
                } else {
                    user
                };
                let user = if options.resolves_groups() {
                    with_groups(user, &groups)
                } else {
                    user
                };
                if options.resolves_managers() {
                    with_manager(user, &managers)
                } else {
                    user
                }
            })
            .collect();

        info!(at = %chrono::Utc::now().to_rfc3339(), "Extended user profiles completed");
        Ok(resolved)
    }

    async fn extend_user(&self, user: Value, flags: &ExtendedFlags) -> EngineResult<Value> {
        let mut record = match user {
            Value::Object(record) => record,
            other => return Ok(other),
        };
        let Some(id) = record.get("id").and_then(Value::as_str).map(str::to_string) else {
            return Ok(Value::Object(record));
        };
        if record.get("state").and_then(Value::as_str) == Some("deleted") {
            return Ok(Value::Object(record));
        }
        debug!(user = %id, "Extending profile");

        if flags.queues {
            record.insert("queues".to_string(), Value::Array(self.user_queues(&id).await?));
        }
        if flags.roles_divisions {
            let subject = self
                .executor
                .execute(&ApiRequest::get(format!("/api/v2/authorization/subjects/{id}")))
                .await?;
            record.insert("grants".to_string(), field_or(&subject, "grants", json!([])));
        }
        if flags.adjacents() {
            let adjacents = self
                .executor
                .execute(&ApiRequest::get(format!("/api/v2/users/{id}/adjacents")))
                .await?;
            record.insert("superiors".to_string(), field_or(&adjacents, "superiors", json!([])));
            record.insert(
                "directReports".to_string(),
                field_or(&adjacents, "directReports", json!([])),
            );
        }
        if flags.phone_alert_timeouts {
            let policy = self
                .executor
                .execute(&ApiRequest::get(format!("/api/v2/voicemail/userpolicies/{id}")))
                .await?;
            record.insert(
                "alertTimeoutSeconds".to_string(),
                field_or(&policy, "alertTimeoutSeconds", Value::Null),
            );
        }

        Ok(Value::Object(record))
    }

    /// Drains the queue memberships of one user.
    async fn user_queues(&self, user_id: &str) -> EngineResult<Vec<Value>> {
        let mut queues = Vec::new();
        let mut page_number: u32 = 1;

        loop {
            let request = ApiRequest::get(format!("/api/v2/users/{user_id}/queues"))
                .query("pageSize", self.queue_page_size)
                .query("pageNumber", page_number);
            let page = self.executor.execute(&request).await?;

            if let Some(entities) = page.get("entities").and_then(Value::as_array) {
                queues.extend(entities.iter().filter(|q| !q.is_null()).cloned());
            }
            let page_count = page.get("pageCount").and_then(Value::as_u64).unwrap_or(0);
            if page_count <= u64::from(page_number) {
                break;
            }
            page_number += 1;
        }

        Ok(queues)
    }

    /// Resolves distinct ids in slices of the target's input limit.
    async fn resolve(&self, target: ResolveTarget, ids: Vec<String>) -> EngineResult<Resolved> {
        let mut resolved = Resolved::new();
        if ids.is_empty() {
            return Ok(resolved);
        }

        let settings = target.settings(self.pagination, self.group_method)?;
        let criteria: Vec<SearchCriterion> = ids.into_iter().map(SearchCriterion::from).collect();
        for slice in criteria.chunks(settings.max_items()) {
            for entity in self.aggregator.aggregate_all(slice, &settings).await? {
                if let Some(id) = entity_id(&entity).map(str::to_string) {
                    resolved.insert(id, entity);
                }
            }
        }

        debug!(
            resource = %settings.kind(),
            requested = criteria.len(),
            resolved = resolved.len(),
            "References resolved"
        );
        Ok(resolved)
    }
}

fn field_or(body: &Value, key: &str, default: Value) -> Value {
    body.get(key).cloned().unwrap_or(default)
}

fn str_field<'a>(entity: &'a Value, key: &str) -> &'a str {
    entity.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Distinct ids in first-seen order.
#[derive(Default)]
struct DistinctIds {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl DistinctIds {
    fn push(&mut self, id: &str) {
        if !id.is_empty() && self.seen.insert(id.to_string()) {
            self.ordered.push(id.to_string());
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

fn array_field<'a>(user: &'a Value, key: &str) -> &'a [Value] {
    user.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn location_ids(users: &[Value]) -> Vec<String> {
    let mut ids = DistinctIds::default();
    for location in users.iter().flat_map(|u| array_field(u, "locations")) {
        if let Some(id) = location.pointer("/locationDefinition/id").and_then(Value::as_str) {
            ids.push(id);
        }
    }
    ids.into_vec()
}

fn group_ids(users: &[Value]) -> Vec<String> {
    let mut ids = DistinctIds::default();
    for group in users.iter().flat_map(|u| array_field(u, "groups")) {
        if let Some(id) = entity_id(group) {
            ids.push(id);
        }
    }
    ids.into_vec()
}

fn manager_ids(users: &[Value]) -> Vec<String> {
    let mut ids = DistinctIds::default();
    for user in users {
        if let Some(id) = user.pointer("/manager/id").and_then(Value::as_str) {
            ids.push(id);
        }
    }
    ids.into_vec()
}

/// Applies `f` to every object of the array field `key`.
fn map_array(mut user: Value, key: &str, f: impl Fn(&mut Map<String, Value>)) -> Value {
    if let Some(items) = user.get_mut(key).and_then(Value::as_array_mut) {
        for item in items.iter_mut().filter_map(Value::as_object_mut) {
            f(item);
        }
    }
    user
}

fn with_locations(user: Value, resolved: &Resolved) -> Value {
    map_array(user, "locations", |location| {
        let Some(definition) = location
            .get_mut("locationDefinition")
            .and_then(Value::as_object_mut)
        else {
            return;
        };
        let name = definition
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| resolved.get(id))
            .map_or("Unknown", |l| str_field(l, "name"));
        definition.insert("name".to_string(), json!(name));
    })
}

fn with_groups(user: Value, resolved: &Resolved) -> Value {
    map_array(user, "groups", |group| {
        let found = group
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| resolved.get(id));
        let (name, member_count, kind, visibility) = match found {
            Some(g) => (
                json!(str_field(g, "name")),
                g.get("memberCount").cloned().unwrap_or(json!(0)),
                json!(str_field(g, "type")),
                json!(str_field(g, "visibility")),
            ),
            None => (json!("Hidden"), json!(0), json!("Hidden"), json!("Hidden")),
        };
        group.insert("name".to_string(), name);
        group.insert("memberCount".to_string(), member_count);
        group.insert("type".to_string(), kind);
        group.insert("visibility".to_string(), visibility);
    })
}

fn with_manager(mut user: Value, resolved: &Resolved) -> Value {
    let Some(manager) = user.get_mut("manager").and_then(Value::as_object_mut) else {
        return user;
    };
    let Some(id) = manager.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()) else {
        return user;
    };

    let fields = match resolved.get(id) {
        Some(m) => [
            ("email", str_field(m, "email")),
            ("name", str_field(m, "name")),
            ("state", str_field(m, "state")),
            ("department", str_field(m, "department")),
            ("title", str_field(m, "title")),
        ],
        None => [
            ("email", ""),
            ("name", ""),
            ("state", "unknown"),
            ("department", ""),
            ("title", ""),
        ],
    };
    let fields: Vec<(String, Value)> = fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), json!(value)))
        .collect();
    manager.extend(fields);
    user
}
