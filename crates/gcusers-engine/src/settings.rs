//! Per-stage search settings.
//!
//! A [`SearchSettings`] is built once per stage through
//! [`SearchSettingsBuilder`], which rejects combinations the remote API
//! cannot serve (cursor pagination on name-filtered listings, AND mode
//! outside users search, batched role-member lookups).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::{EngineError, EngineResult};

/// Most filter clauses one search accepts, one slot kept free for the state clause.
pub const MAX_QUERY_CLAUSES: usize = 9;

/// Remote resource searched by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Users,
    Groups,
    Locations,
    Roles,
    RoleMembers,
    Divisions,
    Skills,
    Languages,
}

impl ResourceKind {
    /// API name, as used in log lines.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Groups => "groups",
            Self::Locations => "locations",
            Self::Roles => "roles",
            Self::RoleMembers => "roleMembers",
            Self::Divisions => "divisions",
            Self::Skills => "skills",
            Self::Languages => "languages",
        }
    }

    /// Kinds whose resolved count is compared to the requested count.
    #[must_use]
    pub fn is_verifiable(&self) -> bool {
        matches!(
            self,
            Self::Groups
                | Self::Skills
                | Self::Languages
                | Self::Divisions
                | Self::Locations
                | Self::Roles
        )
    }

    /// Kinds searched only to validate names; hits are re-keyed as `{id: name}`.
    #[must_use]
    pub fn is_name_validation(&self) -> bool {
        matches!(self, Self::Skills | Self::Languages)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pagination protocol used past the first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationProtocol {
    /// Explicit page index, stop once `pageCount` is reached.
    #[default]
    Numbered,
    /// Opaque `q64` cursor taken from `nextPage`.
    Cursor,
}

/// How multiple criteria values are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldCombination {
    /// Any field matches any value.
    #[default]
    Or,
    /// Every value must match some field.
    And,
}

/// How groups are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupSearchMethod {
    /// Keyword search endpoint. Omits member-visibility groups.
    Search,
    /// Enumerate the whole catalog and filter locally.
    #[default]
    EnumerateAll,
}

/// User states that can be included in a users search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    Active,
    Inactive,
    Deleted,
}

impl EntityState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Deleted => "deleted",
        }
    }

    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![Self::Active, Self::Inactive, Self::Deleted]
    }
}

impl FromStr for EntityState {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "deleted" => Ok(Self::Deleted),
            other => Err(EngineError::Config(format!("Unknown user state: {other}"))),
        }
    }
}

/// Resource-specific part of a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchTarget {
    Users {
        fields: Vec<String>,
        combination: FieldCombination,
        include_states: Vec<EntityState>,
        custom_query: Option<Vec<Value>>,
    },
    Groups {
        fields: Vec<String>,
        method: GroupSearchMethod,
    },
    Locations {
        fields: Vec<String>,
    },
    /// Roles by name.
    Roles,
    /// Members of one role id.
    RoleMembers,
    /// Divisions by name, or all divisions when no value is given.
    Divisions,
    Skills,
    Languages,
}

impl SearchTarget {
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Users { .. } => ResourceKind::Users,
            Self::Groups { .. } => ResourceKind::Groups,
            Self::Locations { .. } => ResourceKind::Locations,
            Self::Roles => ResourceKind::Roles,
            Self::RoleMembers => ResourceKind::RoleMembers,
            Self::Divisions => ResourceKind::Divisions,
            Self::Skills => ResourceKind::Skills,
            Self::Languages => ResourceKind::Languages,
        }
    }
}

/// Immutable descriptor of one search stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    target: SearchTarget,
    max_items: usize,
    max_values: usize,
    expand: Vec<String>,
    pagination: PaginationProtocol,
}

impl SearchSettings {
    /// Users search on `fields`.
    pub fn users<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> SearchSettingsBuilder {
        SearchSettingsBuilder::new(SearchTarget::Users {
            fields: fields.into_iter().map(Into::into).collect(),
            combination: FieldCombination::Or,
            include_states: Vec::new(),
            custom_query: None,
        })
        .limits(5000, 50)
    }

    /// Groups lookup matching on `fields` (`name` or `id`).
    pub fn groups<S: Into<String>>(
        fields: impl IntoIterator<Item = S>,
        method: GroupSearchMethod,
    ) -> SearchSettingsBuilder {
        SearchSettingsBuilder::new(SearchTarget::Groups {
            fields: fields.into_iter().map(Into::into).collect(),
            method,
        })
        .limits(40, 10)
    }

    /// Locations search on `fields`.
    pub fn locations<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> SearchSettingsBuilder {
        SearchSettingsBuilder::new(SearchTarget::Locations {
            fields: fields.into_iter().map(Into::into).collect(),
        })
        .limits(40, 10)
    }

    pub fn roles() -> SearchSettingsBuilder {
        SearchSettingsBuilder::new(SearchTarget::Roles).limits(40, 10)
    }

    pub fn role_members() -> SearchSettingsBuilder {
        SearchSettingsBuilder::new(SearchTarget::RoleMembers).limits(40, 1)
    }

    pub fn divisions() -> SearchSettingsBuilder {
        SearchSettingsBuilder::new(SearchTarget::Divisions).limits(40, 1)
    }

    pub fn skills() -> SearchSettingsBuilder {
        SearchSettingsBuilder::new(SearchTarget::Skills).limits(40, 1)
    }

    pub fn languages() -> SearchSettingsBuilder {
        SearchSettingsBuilder::new(SearchTarget::Languages).limits(40, 1)
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.target.kind()
    }

    #[must_use]
    pub fn target(&self) -> &SearchTarget {
        &self.target
    }

    /// Largest input list the stage accepts.
    #[must_use]
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Criteria values sent in one query.
    #[must_use]
    pub fn max_values(&self) -> usize {
        self.max_values
    }

    #[must_use]
    pub fn expand(&self) -> &[String] {
        &self.expand
    }

    #[must_use]
    pub fn pagination(&self) -> PaginationProtocol {
        self.pagination
    }

    /// Query fields, empty for name-filtered listings.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        match &self.target {
            SearchTarget::Users { fields, .. }
            | SearchTarget::Groups { fields, .. }
            | SearchTarget::Locations { fields } => fields.as_slice(),
            _ => &[],
        }
    }

    #[must_use]
    pub fn combination(&self) -> FieldCombination {
        match &self.target {
            SearchTarget::Users { combination, .. } => *combination,
            _ => FieldCombination::Or,
        }
    }

    #[must_use]
    pub fn include_states(&self) -> &[EntityState] {
        match &self.target {
            SearchTarget::Users { include_states, .. } => include_states.as_slice(),
            _ => &[],
        }
    }

    #[must_use]
    pub fn custom_query(&self) -> Option<&[Value]> {
        match &self.target {
            SearchTarget::Users { custom_query, .. } => custom_query.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn group_method(&self) -> Option<GroupSearchMethod> {
        match &self.target {
            SearchTarget::Groups { method, .. } => Some(*method),
            _ => None,
        }
    }
}

/// Builder for [`SearchSettings`].
#[derive(Debug, Clone)]
pub struct SearchSettingsBuilder {
    target: SearchTarget,
    max_items: usize,
    max_values: usize,
    expand: Vec<String>,
    pagination: PaginationProtocol,
}

impl SearchSettingsBuilder {
    fn new(target: SearchTarget) -> Self {
        Self {
            target,
            max_items: 40,
            max_values: 10,
            expand: Vec::new(),
            pagination: PaginationProtocol::Numbered,
        }
    }

    /// Sets the stage input limit and the values-per-query limit.
    #[must_use]
    pub fn limits(mut self, max_items: usize, max_values: usize) -> Self {
        self.max_items = max_items;
        self.max_values = max_values;
        self
    }

    #[must_use]
    pub fn expand<S: Into<String>>(mut self, expand: impl IntoIterator<Item = S>) -> Self {
        self.expand = expand.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn pagination(mut self, pagination: PaginationProtocol) -> Self {
        self.pagination = pagination;
        self
    }

    /// Sets the field combination (users only).
    #[must_use]
    pub fn combination(mut self, value: FieldCombination) -> Self {
        if let SearchTarget::Users {
            ref mut combination,
            ..
        } = self.target
        {
            *combination = value;
        }
        self
    }

    /// Sets the included user states (users only).
    #[must_use]
    pub fn include_states(mut self, states: impl IntoIterator<Item = EntityState>) -> Self {
        if let SearchTarget::Users {
            ref mut include_states,
            ..
        } = self.target
        {
            *include_states = states.into_iter().collect();
        }
        self
    }

    /// Sets a custom query replacing field/value clauses (users only).
    #[must_use]
    pub fn custom_query(mut self, clauses: Vec<Value>) -> Self {
        if let SearchTarget::Users {
            ref mut custom_query,
            ..
        } = self.target
        {
            *custom_query = Some(clauses);
        }
        self
    }

    /// Validates and builds the stage settings.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for combinations the API cannot serve.
    pub fn build(mut self) -> EngineResult<SearchSettings> {
        let kind = self.target.kind();

        if self.max_items == 0 || self.max_values == 0 {
            return Err(EngineError::Config(format!(
                "{kind}: max_items and max_values must be > 0"
            )));
        }

        if self.pagination == PaginationProtocol::Cursor {
            let supported = match &self.target {
                SearchTarget::Users { .. } | SearchTarget::Locations { .. } => true,
                SearchTarget::Groups { method, .. } => *method == GroupSearchMethod::Search,
                _ => false,
            };
            if !supported {
                return Err(EngineError::Config(format!(
                    "{kind}: cursor pagination is only available on search endpoints"
                )));
            }
        }

        match &mut self.target {
            SearchTarget::Users {
                fields,
                combination,
                custom_query,
                ..
            } => {
                if let Some(clauses) = custom_query {
                    if clauses.is_empty() {
                        return Err(EngineError::Config(
                            "users: custom query must contain at least one clause".to_string(),
                        ));
                    }
                }
                if *combination == FieldCombination::And {
                    if fields.is_empty() || custom_query.is_some() {
                        return Err(EngineError::Config(
                            "users: AND combination needs query fields and no custom query"
                                .to_string(),
                        ));
                    }
                    // One clause per value, slot 10 reserved for the state clause.
                    self.max_items = MAX_QUERY_CLAUSES;
                    self.max_values = MAX_QUERY_CLAUSES;
                }
            }
            SearchTarget::Groups { fields, .. } | SearchTarget::Locations { fields } => {
                if fields.is_empty() {
                    return Err(EngineError::Config(format!(
                        "{kind}: at least one query field is required"
                    )));
                }
            }
            SearchTarget::RoleMembers => {
                if self.max_values != 1 {
                    return Err(EngineError::Config(
                        "roleMembers: members are fetched one role at a time".to_string(),
                    ));
                }
            }
            _ => {}
        }

        Ok(SearchSettings {
            target: self.target,
            max_items: self.max_items,
            max_values: self.max_values,
            expand: self.expand,
            pagination: self.pagination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_users_defaults() {
        let settings = SearchSettings::users(["email"]).build().unwrap();
        assert_eq!(settings.kind(), ResourceKind::Users);
        assert_eq!(settings.max_items(), 5000);
        assert_eq!(settings.max_values(), 50);
        assert_eq!(settings.fields(), ["email".to_string()]);
        assert_eq!(settings.combination(), FieldCombination::Or);
        assert_eq!(settings.pagination(), PaginationProtocol::Numbered);
    }

    #[test]
    fn test_and_combination_clamps_limits() {
        let settings = SearchSettings::users(["routingSkills"])
            .combination(FieldCombination::And)
            .build()
            .unwrap();
        assert_eq!(settings.max_items(), 9);
        assert_eq!(settings.max_values(), 9);
    }

    #[test]
    fn test_and_combination_requires_fields() {
        let result = SearchSettings::users(Vec::<String>::new())
            .combination(FieldCombination::And)
            .build();
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_combination_ignored_outside_users() {
        let settings = SearchSettings::roles()
            .combination(FieldCombination::And)
            .build()
            .unwrap();
        assert_eq!(settings.combination(), FieldCombination::Or);
    }

    #[test]
    fn test_cursor_rejected_on_listings() {
        for builder in [
            SearchSettings::roles(),
            SearchSettings::divisions(),
            SearchSettings::skills(),
            SearchSettings::languages(),
            SearchSettings::role_members(),
            SearchSettings::groups(["name"], GroupSearchMethod::EnumerateAll),
        ] {
            let result = builder.pagination(PaginationProtocol::Cursor).build();
            assert!(matches!(result, Err(EngineError::Config(_))));
        }
    }

    #[test]
    fn test_cursor_accepted_on_search_endpoints() {
        assert!(SearchSettings::users(["id"])
            .pagination(PaginationProtocol::Cursor)
            .build()
            .is_ok());
        assert!(SearchSettings::locations(["name"])
            .pagination(PaginationProtocol::Cursor)
            .build()
            .is_ok());
        assert!(SearchSettings::groups(["name"], GroupSearchMethod::Search)
            .pagination(PaginationProtocol::Cursor)
            .build()
            .is_ok());
    }

    #[test]
    fn test_role_members_one_value_per_query() {
        assert!(SearchSettings::role_members().build().is_ok());
        let result = SearchSettings::role_members().limits(40, 5).build();
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_empty_custom_query_rejected() {
        let result = SearchSettings::users(Vec::<String>::new())
            .custom_query(vec![])
            .build();
        assert!(result.is_err());

        let settings = SearchSettings::users(Vec::<String>::new())
            .custom_query(vec![json!({"fields": ["department"], "value": "Sales", "type": "EXACT"})])
            .build()
            .unwrap();
        assert_eq!(settings.custom_query().map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_locations_need_fields() {
        let result = SearchSettings::locations(Vec::<String>::new()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_entity_state_parsing() {
        assert_eq!("Active".parse::<EntityState>().unwrap(), EntityState::Active);
        assert_eq!(" deleted ".parse::<EntityState>().unwrap(), EntityState::Deleted);
        assert!("suspended".parse::<EntityState>().is_err());
    }

    #[test]
    fn test_resource_kind_flags() {
        assert!(ResourceKind::Skills.is_name_validation());
        assert!(!ResourceKind::Users.is_verifiable());
        assert!(ResourceKind::Roles.is_verifiable());
        assert_eq!(ResourceKind::RoleMembers.to_string(), "roleMembers");
    }
}
