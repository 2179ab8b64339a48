//! Role update planning.
//!
//! Role names and division expressions are resolved once against the role
//! and division directories, then every selected user is scanned once to
//! build a [`BulkRoleUpdatePlan`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument, warn};

use crate::aggregate::{entity_id, Aggregator, SearchCriterion};
use crate::pipeline::ResolveTarget;
use crate::settings::{GroupSearchMethod, PaginationProtocol};
use crate::{EngineError, EngineResult, VerifyInput};

/// Division a role is granted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DivisionSpec {
    /// `@Home`: the organization home division.
    Home,
    /// `@User`: each user's own division.
    OwnUser,
    /// A division name.
    Named(String),
}

impl FromStr for DivisionSpec {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(EngineError::Config("Empty division name".to_string())),
            "@Home" => Ok(Self::Home),
            "@User" => Ok(Self::OwnUser),
            name => Ok(Self::Named(name.to_string())),
        }
    }
}

impl TryFrom<String> for DivisionSpec {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DivisionSpec> for String {
    fn from(spec: DivisionSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for DivisionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => f.write_str("@Home"),
            Self::OwnUser => f.write_str("@User"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// A role to grant and the divisions to grant it on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: String,
    pub divisions: Vec<DivisionSpec>,
}

impl FromStr for RoleGrant {
    type Err = EngineError;

    /// Parses `role(division;division)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expression = s.trim();
        let parsed = expression
            .split_once('(')
            .and_then(|(role, rest)| rest.strip_suffix(')').map(|divisions| (role.trim(), divisions)));

        let Some((role, divisions)) = parsed else {
            return Err(EngineError::Config(format!(
                "Invalid role expression '{expression}', expected role(division;division)"
            )));
        };
        if role.is_empty() {
            return Err(EngineError::Config(format!(
                "Missing role name in '{expression}'"
            )));
        }

        let divisions = divisions
            .split(';')
            .filter(|d| !d.trim().is_empty())
            .map(str::parse)
            .collect::<EngineResult<Vec<DivisionSpec>>>()?;
        if divisions.is_empty() {
            return Err(EngineError::Config(format!(
                "Role '{role}' has no division"
            )));
        }

        Ok(Self {
            role: role.to_string(),
            divisions,
        })
    }
}

/// Roles to revoke and grant on the selected users.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleUpdateRequest {
    remove: Vec<String>,
    add: Vec<RoleGrant>,
}

impl RoleUpdateRequest {
    /// Builds a request. A role listed in both lists is only granted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when both lists are empty.
    pub fn new(remove: Vec<String>, add: Vec<RoleGrant>) -> EngineResult<Self> {
        let granted: HashSet<&str> = add.iter().map(|g| g.role.as_str()).collect();
        let mut seen = HashSet::new();
        let remove: Vec<String> = remove
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .filter(|r| {
                if granted.contains(r.as_str()) {
                    warn!(role = %r, "Role listed in both remove and add lists, keeping the grant only");
                    return false;
                }
                seen.insert(r.clone())
            })
            .collect();

        if remove.is_empty() && add.is_empty() {
            return Err(EngineError::Config(
                "No roles to remove or add".to_string(),
            ));
        }
        Ok(Self { remove, add })
    }

    #[must_use]
    pub fn remove(&self) -> &[String] {
        &self.remove
    }

    #[must_use]
    pub fn add(&self) -> &[RoleGrant] {
        &self.add
    }

    /// Distinct role names referenced by the request.
    #[must_use]
    pub fn role_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.remove.iter().chain(self.add.iter().map(|g| &g.role)) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    fn uses_own_division(&self) -> bool {
        self.add
            .iter()
            .any(|g| g.divisions.contains(&DivisionSpec::OwnUser))
    }
}

/// Role ids by role name.
#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    by_name: HashMap<String, String>,
}

impl RoleDirectory {
    #[must_use]
    pub fn from_roles(roles: &[Value]) -> Self {
        let by_name = roles
            .iter()
            .filter_map(|role| {
                let name = role.get("name").and_then(Value::as_str)?;
                let id = entity_id(role)?;
                Some((name.to_string(), id.to_string()))
            })
            .collect();
        Self { by_name }
    }

    /// Looks up `names` through the roles search.
    ///
    /// # Errors
    ///
    /// Propagates search failures.
    pub async fn load(aggregator: &Aggregator, names: &[String]) -> EngineResult<Self> {
        if names.is_empty() {
            return Ok(Self::default());
        }
        let criteria: Vec<SearchCriterion> = names.iter().map(|n| SearchCriterion::new(n.as_str())).collect();
        let settings = ResolveTarget::Roles.settings(PaginationProtocol::Numbered, GroupSearchMethod::default())?;
        let roles = aggregator
            .with_verify(VerifyInput::Off)
            .aggregate_all(&criteria, &settings)
            .await?;
        Ok(Self::from_roles(&roles))
    }

    #[must_use]
    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    /// Checks that every requested role name was found.
    ///
    /// # Errors
    ///
    /// Under strict verification, unknown roles abort the run.
    pub fn verify(&self, requested: &[String], verify: VerifyInput, label: &str) -> EngineResult<()> {
        if !verify.is_enabled() {
            return Ok(());
        }
        let unknown: Vec<String> = requested
            .iter()
            .filter(|name| !self.by_name.contains_key(name.as_str()))
            .cloned()
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }

        warn!(
            requested = requested.len(),
            found = requested.len() - unknown.len(),
            ?unknown,
            "Input verification on roles to {label}: unknown roles"
        );
        if verify == VerifyInput::Strict {
            return Err(EngineError::VerificationMismatch {
                resource: format!("roles to {label}"),
                requested: requested.len(),
                resolved: requested.len() - unknown.len(),
                unknown,
            });
        }
        Ok(())
    }
}

/// Division ids by name, and the home division.
#[derive(Debug, Clone, Default)]
pub struct DivisionDirectory {
    by_name: HashMap<String, String>,
    home: Option<String>,
}

impl DivisionDirectory {
    #[must_use]
    pub fn from_divisions(divisions: &[Value]) -> Self {
        let mut directory = Self::default();
        for division in divisions {
            let (Some(name), Some(id)) = (
                division.get("name").and_then(Value::as_str),
                entity_id(division),
            ) else {
                continue;
            };
            if division.get("homeDivision").and_then(Value::as_bool) == Some(true) {
                directory.home = Some(id.to_string());
            }
            directory.by_name.insert(name.to_string(), id.to_string());
        }
        directory
    }

    /// Loads every division.
    ///
    /// # Errors
    ///
    /// Propagates search failures.
    pub async fn load(aggregator: &Aggregator) -> EngineResult<Self> {
        let settings = ResolveTarget::Divisions.settings(PaginationProtocol::Numbered, GroupSearchMethod::default())?;
        let divisions = aggregator
            .with_verify(VerifyInput::Off)
            .aggregate_all(&[], &settings)
            .await?;
        Ok(Self::from_divisions(&divisions))
    }

    #[must_use]
    pub fn home_division_id(&self) -> Option<&str> {
        self.home.as_deref()
    }

    #[must_use]
    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }
}

/// Users losing one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRevoke {
    pub role_name: String,
    pub role_id: String,
    pub user_ids: Vec<String>,
}

/// Users gaining one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrantBatch {
    pub role_name: String,
    pub role_id: String,
    pub user_ids: Vec<String>,
    /// Explicit divisions, `@Home` expanded, deduplicated.
    pub divisions: Vec<String>,
    /// Users granted on their own division, by division id, for divisions
    /// outside the explicit set. Ordered by first appearance.
    pub own_divisions: Vec<(String, Vec<String>)>,
}

/// Revokes and grants for one run, consumed once by the batcher.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkRoleUpdatePlan {
    pub revokes: Vec<RoleRevoke>,
    pub grants: Vec<RoleGrantBatch>,
}

impl BulkRoleUpdatePlan {
    /// Scans `selected` once against the requested role changes.
    ///
    /// Unknown roles and divisions are logged and skipped. Users without a
    /// division are left out of `@User` grants.
    #[instrument(skip_all, fields(users = selected.len()))]
    pub fn build(
        selected: &[Value],
        request: &RoleUpdateRequest,
        roles: &RoleDirectory,
        divisions: &DivisionDirectory,
    ) -> Self {
        let mut revokes: Vec<RoleRevoke> = request
            .remove()
            .iter()
            .filter_map(|name| match roles.id_for(name) {
                Some(id) => Some(RoleRevoke {
                    role_name: name.clone(),
                    role_id: id.to_string(),
                    user_ids: Vec::new(),
                }),
                None => {
                    warn!(role = %name, "Unknown role to remove, skipping");
                    None
                }
            })
            .collect();

        let mut grants: Vec<(RoleGrantBatch, bool)> = request
            .add()
            .iter()
            .filter_map(|grant| {
                let Some(role_id) = roles.id_for(&grant.role) else {
                    warn!(role = %grant.role, "Unknown role to add, skipping");
                    return None;
                };
                let (division_ids, own_division) = resolve_divisions(&grant.divisions, divisions);
                Some((
                    RoleGrantBatch {
                        role_name: grant.role.clone(),
                        role_id: role_id.to_string(),
                        user_ids: Vec::new(),
                        divisions: division_ids,
                        own_divisions: Vec::new(),
                    },
                    own_division,
                ))
            })
            .collect();

        let own_division_needed = request.uses_own_division();

        for user in selected {
            let Some(user_id) = entity_id(user) else {
                continue;
            };

            if !revokes.is_empty() {
                let held = held_role_names(user);
                for revoke in &mut revokes {
                    if held.contains(revoke.role_name.as_str()) {
                        revoke.user_ids.push(user_id.to_string());
                    }
                }
            }

            let user_division = if own_division_needed {
                user.pointer("/division/id").and_then(Value::as_str)
            } else {
                None
            };

            for (grant, own_division) in &mut grants {
                grant.user_ids.push(user_id.to_string());
                if !*own_division {
                    continue;
                }
                match user_division {
                    Some(division_id) if grant.divisions.iter().any(|d| d == division_id) => {}
                    Some(division_id) => push_own_division(&mut grant.own_divisions, division_id, user_id),
                    None => warn!(user = %user_id, role = %grant.role_name, "User has no division, skipping @User grant"),
                }
            }
        }

        let plan = Self {
            revokes,
            grants: grants.into_iter().map(|(grant, _)| grant).collect(),
        };
        debug!(
            revokes = plan.revokes.len(),
            grants = plan.grants.len(),
            "Role update plan built"
        );
        plan
    }
}

/// Expands division expressions into ids and reports whether `@User` was asked.
fn resolve_divisions(specs: &[DivisionSpec], directory: &DivisionDirectory) -> (Vec<String>, bool) {
    let mut ids: Vec<String> = Vec::new();
    let mut own_division = false;

    for spec in specs {
        let id = match spec {
            DivisionSpec::OwnUser => {
                own_division = true;
                continue;
            }
            DivisionSpec::Home => directory.home_division_id(),
            DivisionSpec::Named(name) => directory.id_for(name),
        };
        match id {
            Some(id) if !ids.iter().any(|known| known == id) => ids.push(id.to_string()),
            Some(_) => {}
            None => warn!(division = %spec, "Unknown division, skipping"),
        }
    }

    (ids, own_division)
}

fn held_role_names(user: &Value) -> HashSet<&str> {
    user.pointer("/authorization/roles")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(|r| r.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

fn push_own_division(own: &mut Vec<(String, Vec<String>)>, division_id: &str, user_id: &str) {
    match own.iter_mut().find(|(id, _)| id == division_id) {
        Some((_, users)) => users.push(user_id.to_string()),
        None => own.push((division_id.to_string(), vec![user_id.to_string()])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directories() -> (RoleDirectory, DivisionDirectory) {
        let roles = RoleDirectory::from_roles(&[
            json!({"id": "r-sup", "name": "Supervisor"}),
            json!({"id": "r-agent", "name": "Agent"}),
            json!({"id": "r-admin", "name": "Admin"}),
        ]);
        let divisions = DivisionDirectory::from_divisions(&[
            json!({"id": "d-home", "name": "Home", "homeDivision": true}),
            json!({"id": "d1", "name": "EMEA"}),
            json!({"id": "d2", "name": "APAC"}),
        ]);
        (roles, divisions)
    }

    fn user(id: &str, division: &str, roles: &[&str]) -> Value {
        let roles: Vec<Value> = roles.iter().map(|r| json!({"name": r})).collect();
        json!({
            "id": id,
            "division": {"id": division},
            "authorization": {"roles": roles}
        })
    }

    #[test]
    fn test_parse_role_grant() {
        let grant: RoleGrant = "Supervisor(@Home; EMEA;@User)".parse().unwrap();
        assert_eq!(grant.role, "Supervisor");
        assert_eq!(
            grant.divisions,
            vec![
                DivisionSpec::Home,
                DivisionSpec::Named("EMEA".to_string()),
                DivisionSpec::OwnUser
            ]
        );

        assert!("Supervisor".parse::<RoleGrant>().is_err());
        assert!("(EMEA)".parse::<RoleGrant>().is_err());
        assert!("Supervisor()".parse::<RoleGrant>().is_err());
    }

    #[test]
    fn test_division_spec_serde() {
        let specs: Vec<DivisionSpec> = serde_json::from_value(json!(["@Home", "@User", "EMEA"])).unwrap();
        assert_eq!(specs[0], DivisionSpec::Home);
        assert_eq!(specs[1], DivisionSpec::OwnUser);
        assert_eq!(serde_json::to_value(&specs).unwrap(), json!(["@Home", "@User", "EMEA"]));
    }

    #[test]
    fn test_role_in_both_lists_is_only_granted() {
        let request = RoleUpdateRequest::new(
            vec!["Agent".to_string(), "Supervisor".to_string()],
            vec!["Supervisor(EMEA)".parse().unwrap()],
        )
        .unwrap();
        assert_eq!(request.remove(), ["Agent".to_string()]);
        assert_eq!(request.role_names(), vec!["Agent", "Supervisor"]);
    }

    #[test]
    fn test_empty_request_rejected() {
        assert!(RoleUpdateRequest::new(vec![" ".to_string()], vec![]).is_err());
    }

    #[test]
    fn test_revoke_only_users_holding_role() {
        let (roles, divisions) = directories();
        let request = RoleUpdateRequest::new(vec!["Agent".to_string()], vec![]).unwrap();
        let selected = vec![
            user("u1", "d1", &["Agent"]),
            user("u2", "d1", &["Supervisor"]),
            user("u3", "d2", &["Agent", "Admin"]),
        ];

        let plan = BulkRoleUpdatePlan::build(&selected, &request, &roles, &divisions);
        assert_eq!(plan.revokes.len(), 1);
        assert_eq!(plan.revokes[0].role_id, "r-agent");
        assert_eq!(plan.revokes[0].user_ids, vec!["u1", "u3"]);
        assert!(plan.grants.is_empty());
    }

    #[test]
    fn test_own_division_not_duplicated_into_explicit_division() {
        let (roles, divisions) = directories();
        let request = RoleUpdateRequest::new(
            vec![],
            vec!["Supervisor(EMEA;@User)".parse().unwrap()],
        )
        .unwrap();
        let selected = vec![
            user("u1", "d1", &[]),
            user("u2", "d2", &[]),
            user("u3", "d2", &[]),
        ];

        let plan = BulkRoleUpdatePlan::build(&selected, &request, &roles, &divisions);
        let grant = &plan.grants[0];
        assert_eq!(grant.divisions, vec!["d1"]);
        assert_eq!(grant.user_ids, vec!["u1", "u2", "u3"]);
        assert_eq!(
            grant.own_divisions,
            vec![("d2".to_string(), vec!["u2".to_string(), "u3".to_string()])]
        );
    }

    #[test]
    fn test_home_division_expanded_once() {
        let (roles, divisions) = directories();
        let request = RoleUpdateRequest::new(
            vec![],
            vec!["Agent(@Home;Home;Unknown)".parse().unwrap()],
        )
        .unwrap();

        let plan = BulkRoleUpdatePlan::build(&[user("u1", "d1", &[])], &request, &roles, &divisions);
        assert_eq!(plan.grants[0].divisions, vec!["d-home"]);
        assert!(plan.grants[0].own_divisions.is_empty());
    }

    #[test]
    fn test_unknown_roles_skipped_and_verified() {
        let (roles, divisions) = directories();
        let request = RoleUpdateRequest::new(vec!["Ghost".to_string()], vec![]).unwrap();

        let plan = BulkRoleUpdatePlan::build(&[user("u1", "d1", &["Ghost"])], &request, &roles, &divisions);
        assert!(plan.revokes.is_empty());

        assert!(roles.verify(request.remove(), VerifyInput::Warn, "remove").is_ok());
        assert!(matches!(
            roles.verify(request.remove(), VerifyInput::Strict, "remove"),
            Err(EngineError::VerificationMismatch { .. })
        ));
    }
}
