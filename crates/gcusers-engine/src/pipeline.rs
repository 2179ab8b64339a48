//! Selection pipeline.
//!
//! Each [`SelectionType`] maps to a fixed list of dependent search stages.
//! Stage `i + 1` receives the ids of stage `i`'s results as criteria; the
//! last stage yields the selected users.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{info, instrument, warn};

use crate::aggregate::{Aggregator, SearchCriterion};
use crate::settings::{
    EntityState, FieldCombination, GroupSearchMethod, PaginationProtocol, SearchSettings,
};
use crate::{EngineError, EngineResult, VerifyInput};

/// Dimension by which users are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionType {
    All,
    Custom,
    Role,
    Division,
    Email,
    Name,
    Id,
    Manager,
    Location,
    Group,
    Language,
    Skill,
    ProfileSkill,
    Certification,
    Department,
    Addresses,
    PrimaryContactInfo,
}

impl SelectionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Custom => "custom",
            Self::Role => "role",
            Self::Division => "division",
            Self::Email => "email",
            Self::Name => "name",
            Self::Id => "id",
            Self::Manager => "manager",
            Self::Location => "location",
            Self::Group => "group",
            Self::Language => "language",
            Self::Skill => "skill",
            Self::ProfileSkill => "profileSkill",
            Self::Certification => "certification",
            Self::Department => "department",
            Self::Addresses => "addresses",
            Self::PrimaryContactInfo => "primaryContactInfo",
        }
    }

    /// Whether the AND field combination is accepted for this type.
    #[must_use]
    pub fn supports_and(&self) -> bool {
        !matches!(
            self,
            Self::Role
                | Self::Id
                | Self::Email
                | Self::Name
                | Self::Custom
                | Self::Division
                | Self::Manager
                | Self::Department
                | Self::All
        )
    }

    /// Types whose input values are lower-cased before searching.
    #[must_use]
    pub fn is_case_insensitive(&self) -> bool {
        matches!(self, Self::Email | Self::Manager | Self::Id)
    }

    /// Separator for inline value lists.
    #[must_use]
    pub fn value_separator(&self) -> char {
        match self {
            Self::Location => '|',
            _ => ',',
        }
    }

    /// Types that take no input values.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        matches!(self, Self::All | Self::Custom)
    }

    /// Trims one raw input value, lower-casing it for case-insensitive types.
    #[must_use]
    pub fn criterion(&self, raw: &str) -> Option<SearchCriterion> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        if self.is_case_insensitive() {
            Some(SearchCriterion::new(value.to_lowercase()))
        } else {
            Some(SearchCriterion::new(value))
        }
    }

    /// Query fields of the final users stage.
    fn user_fields(&self) -> &'static [&'static str] {
        match self {
            Self::All | Self::Custom => &[],
            Self::Id | Self::Role => &["id"],
            Self::Email => &["email"],
            Self::Name => &["name"],
            Self::Department => &["department"],
            Self::Skill => &["routingSkills"],
            Self::ProfileSkill => &["profileSkills"],
            Self::Certification => &["certifications"],
            Self::Language => &["languages"],
            Self::Addresses => &["addresses"],
            Self::PrimaryContactInfo => &["primaryContactInfo"],
            Self::Manager => &["manager.id"],
            Self::Division => &["divisionId"],
            Self::Group => &["groups.official.guid", "groups.social.guid"],
            Self::Location => &["location.location.value.guid"],
        }
    }
}

impl fmt::Display for SelectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.trim() {
            "all" => Self::All,
            "custom" => Self::Custom,
            "role" => Self::Role,
            "division" => Self::Division,
            "email" => Self::Email,
            "name" => Self::Name,
            "id" | "gcid" => Self::Id,
            "manager" => Self::Manager,
            "location" => Self::Location,
            "group" => Self::Group,
            "language" => Self::Language,
            "skill" => Self::Skill,
            "profileSkill" => Self::ProfileSkill,
            "certification" => Self::Certification,
            "department" => Self::Department,
            "addresses" => Self::Addresses,
            "primaryContactInfo" => Self::PrimaryContactInfo,
            other => {
                return Err(EngineError::Config(format!(
                    "Unsupported selection type: {other}"
                )))
            }
        };
        Ok(parsed)
    }
}

/// Action run on the selected users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Export,
    UpdateRoles,
    UpdateAutoAnswer,
    Test,
}

impl Action {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::UpdateRoles => "updateRoles",
            Self::UpdateAutoAnswer => "updateACDAutoAnswer",
            Self::Test => "test",
        }
    }
}

impl FromStr for Action {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "export" => Ok(Self::Export),
            "updateRoles" => Ok(Self::UpdateRoles),
            "updateACDAutoAnswer" => Ok(Self::UpdateAutoAnswer),
            "test" => Ok(Self::Test),
            other => Err(EngineError::Config(format!("Unsupported action: {other}"))),
        }
    }
}

/// User attributes requested through `expand` on users searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncludeFlags {
    pub roles: bool,
    pub profile_skills: bool,
    pub certifications: bool,
    pub locations: bool,
    pub groups: bool,
    pub skills: bool,
    pub languages: bool,
    pub language_preference: bool,
    pub hr: bool,
    pub biography: bool,
}

impl IncludeFlags {
    /// Expand values for the enabled flags, in a stable order.
    #[must_use]
    pub fn expand_values(&self) -> Vec<String> {
        [
            (self.roles, "authorization"),
            (self.profile_skills, "profileSkills"),
            (self.certifications, "certifications"),
            (self.locations, "locations"),
            (self.groups, "groups"),
            (self.skills, "skills"),
            (self.languages, "languages"),
            (self.language_preference, "languagePreference"),
            (self.hr, "employerInfo"),
            (self.biography, "biography"),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, value)| value.to_string())
        .collect()
    }
}

/// Expand list for users stages.
///
/// Mutating actions only fetch what they need unless a post-selection
/// filter may inspect other attributes.
#[must_use]
pub fn expand_list(action: Action, post_filter: bool, include: &IncludeFlags) -> Vec<String> {
    match (action, post_filter) {
        (Action::UpdateRoles, false) => vec!["authorization".to_string()],
        (Action::UpdateAutoAnswer | Action::Test, false) => Vec::new(),
        _ => include.expand_values(),
    }
}

/// Validated selection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionConfig {
    pub selection_type: SelectionType,
    pub include_states: Vec<EntityState>,
    pub combination: FieldCombination,
    pub pagination: PaginationProtocol,
    pub group_method: GroupSearchMethod,
    pub custom_query: Option<Vec<Value>>,
    pub expand: Vec<String>,
}

impl SelectionConfig {
    pub fn new(selection_type: SelectionType) -> Self {
        Self {
            selection_type,
            include_states: vec![EntityState::Active, EntityState::Inactive],
            combination: FieldCombination::Or,
            pagination: PaginationProtocol::Numbered,
            group_method: GroupSearchMethod::default(),
            custom_query: None,
            expand: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_include_states(mut self, states: Vec<EntityState>) -> Self {
        self.include_states = states;
        self
    }

    #[must_use]
    pub fn with_combination(mut self, combination: FieldCombination) -> Self {
        self.combination = combination;
        self
    }

    #[must_use]
    pub fn with_pagination(mut self, pagination: PaginationProtocol) -> Self {
        self.pagination = pagination;
        self
    }

    #[must_use]
    pub fn with_group_method(mut self, method: GroupSearchMethod) -> Self {
        self.group_method = method;
        self
    }

    #[must_use]
    pub fn with_custom_query(mut self, clauses: Vec<Value>) -> Self {
        self.custom_query = Some(clauses);
        self
    }

    #[must_use]
    pub fn with_expand(mut self, expand: Vec<String>) -> Self {
        self.expand = expand;
        self
    }

    /// Rejects combinations no stage list can serve.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] on an unsupported AND combination or
    /// a custom selection without query clauses.
    pub fn validate(&self) -> EngineResult<()> {
        if self.combination == FieldCombination::And && !self.selection_type.supports_and() {
            return Err(EngineError::Config(format!(
                "AND combination is not supported when selecting by {}",
                self.selection_type
            )));
        }
        if self.selection_type == SelectionType::Custom
            && self.custom_query.as_ref().map_or(true, Vec::is_empty)
        {
            return Err(EngineError::Config(
                "Custom selection requires a custom filter".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the stage list for this selection.
    ///
    /// Skill and language selections get a name-validation stage only when
    /// input verification is enabled.
    ///
    /// # Errors
    ///
    /// Fails validation, or when a stage cannot be built.
    pub fn plan(&self, verify: VerifyInput) -> EngineResult<Vec<SearchSettings>> {
        self.validate()?;
        let mut stages = Vec::new();

        match self.selection_type {
            SelectionType::Manager => {
                stages.push(
                    SearchSettings::users(["email"])
                        .limits(40, 50)
                        .include_states(self.include_states.iter().copied())
                        .pagination(self.pagination)
                        .build()?,
                );
            }
            SelectionType::Division => stages.push(SearchSettings::divisions().build()?),
            SelectionType::Group => stages.push(
                SearchSettings::groups(["name"], self.group_method)
                    .limits(40, 10)
                    .build()?,
            ),
            SelectionType::Location => {
                stages.push(SearchSettings::locations(["name"]).limits(40, 10).build()?);
            }
            SelectionType::Role => {
                stages.push(SearchSettings::roles().build()?);
                stages.push(SearchSettings::role_members().build()?);
            }
            SelectionType::Skill if verify.is_enabled() => {
                stages.push(SearchSettings::skills().build()?);
            }
            SelectionType::Language if verify.is_enabled() => {
                stages.push(SearchSettings::languages().build()?);
            }
            _ => {}
        }

        stages.push(self.users_stage()?);
        Ok(stages)
    }

    fn users_stage(&self) -> EngineResult<SearchSettings> {
        let max_values = if self.selection_type.is_unfiltered() {
            1
        } else {
            50
        };
        let mut builder = SearchSettings::users(self.selection_type.user_fields().iter().copied())
            .limits(5000, max_values)
            .expand(self.expand.iter().cloned())
            .combination(self.combination)
            .include_states(self.include_states.iter().copied())
            .pagination(self.pagination);

        if self.selection_type == SelectionType::Custom {
            if let Some(ref clauses) = self.custom_query {
                builder = builder.custom_query(clauses.clone());
            }
        }
        builder.build()
    }
}

/// Foreign entities resolved in bulk after selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveTarget {
    Locations,
    Groups,
    Managers,
    Roles,
    Divisions,
}

impl ResolveTarget {
    /// Search settings resolving ids (or role names) of this kind.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the settings cannot be built.
    pub fn settings(
        self,
        pagination: PaginationProtocol,
        group_method: GroupSearchMethod,
    ) -> EngineResult<SearchSettings> {
        match self {
            Self::Locations => SearchSettings::locations(["id"]).limits(100, 10).build(),
            // Enumeration sends no ids, so the whole set fits one pass.
            Self::Groups => {
                let max_items = match group_method {
                    GroupSearchMethod::EnumerateAll => usize::MAX,
                    GroupSearchMethod::Search => 100,
                };
                SearchSettings::groups(["id"], group_method)
                    .limits(max_items, 10)
                    .build()
            }
            Self::Managers => SearchSettings::users(["id"])
                .limits(100, 50)
                .include_states(EntityState::all())
                .pagination(pagination)
                .build(),
            Self::Roles => SearchSettings::roles().build(),
            Self::Divisions => SearchSettings::divisions().build(),
        }
    }
}

/// Post-selection predicate applied to every selected user.
pub trait SelectionFilter: Send + Sync {
    fn accept(&self, entity: &Value) -> bool;
}

impl<F> SelectionFilter for F
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn accept(&self, entity: &Value) -> bool {
        self(entity)
    }
}

/// Keeps the users accepted by `filter`.
///
/// # Errors
///
/// An empty selection, or an empty filtered result, is an
/// [`EngineError::EmptySelection`].
pub fn apply_filter(selected: Vec<Value>, filter: &dyn SelectionFilter) -> EngineResult<Vec<Value>> {
    if selected.is_empty() {
        return Err(EngineError::EmptySelection(
            "no users to filter".to_string(),
        ));
    }
    let before = selected.len();
    let filtered: Vec<Value> = selected.into_iter().filter(|u| filter.accept(u)).collect();
    if filtered.is_empty() {
        return Err(EngineError::EmptySelection(format!(
            "post-selection filter rejected all {before} users"
        )));
    }
    info!(before = before, after = filtered.len(), "Post-selection filter applied");
    Ok(filtered)
}

/// Runs the stage list of one selection.
#[derive(Debug, Clone)]
pub struct SelectionPipeline {
    aggregator: Aggregator,
    selection: SelectionConfig,
}

impl SelectionPipeline {
    pub fn new(aggregator: Aggregator, selection: SelectionConfig) -> Self {
        Self {
            aggregator,
            selection,
        }
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionConfig {
        &self.selection
    }

    /// Resolves `input` into the selected users.
    ///
    /// # Errors
    ///
    /// Any stage failure aborts the run. A stage resolving nothing is an
    /// [`EngineError::EmptySelection`]; the next stage is never run unfiltered.
    #[instrument(skip(self, input), fields(selection = %self.selection.selection_type, inputs = input.len()))]
    pub async fn run(&self, input: Vec<SearchCriterion>) -> EngineResult<Vec<Value>> {
        let selection_type = self.selection.selection_type;
        let stages = self.selection.plan(self.aggregator.verify())?;

        let mut criteria = if selection_type.is_unfiltered() {
            vec![SearchCriterion::new(selection_type.as_str())]
        } else {
            input
        };
        if criteria.is_empty() {
            return Err(EngineError::EmptySelection(format!(
                "no input values for selection by {selection_type}"
            )));
        }

        let last = stages.len() - 1;
        let mut results = Vec::new();
        for (index, stage) in stages.iter().enumerate() {
            results = self.aggregator.aggregate_all(&criteria, stage).await?;
            info!(
                stage = index + 1,
                resource = %stage.kind(),
                found = results.len(),
                "Stage completed"
            );

            if results.is_empty() {
                warn!(stage = index + 1, resource = %stage.kind(), "Stage resolved no entities");
                return Err(EngineError::EmptySelection(format!(
                    "{} stage resolved no entities for selection by {selection_type}",
                    stage.kind()
                )));
            }
            if index < last {
                criteria = SearchCriterion::from_entities(&results);
            }
        }

        Ok(results)
    }
}
