//! Tool settings
//!
//! Settings are read from a JSON file, overridden by command-line arguments
//! and validated once, before any remote call, into [`RunSettings`].

use gcusers_engine::{
    expand_list, Action, AttributeToggle, ClientCredentials, EngineConfig, EntityState,
    ExtendedFlags, FieldCombination, GroupSearchMethod, IncludeFlags, PaginationProtocol,
    ProfileOptions, ResolveFlags, RoleGrant, RoleUpdateRequest, SelectionConfig, SelectionType,
    Verbosity, VerifyInput,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cli::{Commands, GlobalArgs};
use crate::error::{CliError, CliResult};
use crate::export::{ExportFormat, ExportOptions, DEFAULT_EXPORT_FILE};
use crate::filter::{AttributeFilter, FilterSettings};
use crate::input::{InputFormat, InputSource};

/// Settings file document
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    pub debug_level: u8,
    pub action: Option<String>,
    pub verify_input: u8,
    pub oauth: OAuthSettings,
    pub select_users: SelectUsersSettings,
    pub update: UpdateSettings,
    pub export: ExportSettings,
    /// Pacing, retry, page and bulk sizes.
    pub engine: EngineConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OAuthSettings {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub org_region: String,
    /// Overrides `https://login.<orgRegion>`.
    pub login_url: Option<String>,
    /// Overrides `https://api.<orgRegion>`.
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectUsersSettings {
    /// User states to include.
    pub include: Vec<String>,
    pub by_type: String,
    /// `value` or `file`.
    pub by: String,
    pub by_value: String,
    pub by_file: String,
    pub by_file_as: String,
    pub by_file_attribute_name: String,
    pub field_separator: String,
    pub custom_filter_file: String,
    pub filter_conditions_as_and: bool,
    pub enable_post_selection_filter: bool,
    pub post_selection_filter: FilterSettings,
    pub use_q64_pagination: bool,
    pub use_groups_search: bool,
}

impl Default for SelectUsersSettings {
    fn default() -> Self {
        Self {
            include: vec!["active".to_string(), "inactive".to_string()],
            by_type: String::new(),
            by: String::new(),
            by_value: String::new(),
            by_file: String::new(),
            by_file_as: String::new(),
            by_file_attribute_name: String::new(),
            field_separator: ",".to_string(),
            custom_filter_file: String::new(),
            filter_conditions_as_and: false,
            enable_post_selection_filter: false,
            post_selection_filter: FilterSettings::default(),
            use_q64_pagination: true,
            use_groups_search: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateSettings {
    pub acd_auto_answer: AutoAnswerSettings,
    pub roles: RolesSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoAnswerSettings {
    /// `true`, `false`, `forceTrue` or `forceFalse`.
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RolesSettings {
    pub remove: Vec<String>,
    /// `role(division;division)` expressions.
    pub add: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportSettings {
    #[serde(rename = "as")]
    pub format: String,
    pub file: String,
    pub field_separator: String,
    pub resolve: Vec<String>,
    pub extended: Vec<String>,
    pub include: Vec<String>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            file: DEFAULT_EXPORT_FILE.to_string(),
            field_separator: ",".to_string(),
            resolve: Vec::new(),
            extended: Vec::new(),
            include: Vec::new(),
        }
    }
}

/// Validated work for one run
#[derive(Debug)]
pub struct RunSettings {
    pub credentials: ClientCredentials,
    pub region: String,
    pub login_url: String,
    pub api_url: Option<String>,
    pub engine: EngineConfig,
    pub selection: SelectionConfig,
    pub input: InputSource,
    pub post_filter: Option<AttributeFilter>,
    pub action: ActionPlan,
}

/// Action-specific parameters
#[derive(Debug)]
pub enum ActionPlan {
    Export {
        options: ExportOptions,
        profile: ProfileOptions,
    },
    UpdateRoles(RoleUpdateRequest),
    UpdateAutoAnswer(AttributeToggle),
    Test,
}

impl ActionPlan {
    pub fn action(&self) -> Action {
        match self {
            ActionPlan::Export { .. } => Action::Export,
            ActionPlan::UpdateRoles(_) => Action::UpdateRoles,
            ActionPlan::UpdateAutoAnswer(_) => Action::UpdateAutoAnswer,
            ActionPlan::Test => Action::Test,
        }
    }
}

impl ToolSettings {
    /// Load settings from `path`, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        let Some(path) = path else {
            debug!("No settings file provided, using defaults");
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read settings file {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> CliResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| CliError::Config(format!("Invalid settings file: {}", e)))
    }

    /// Apply command-line overrides
    pub fn apply_args(&mut self, args: &GlobalArgs) {
        if let Some(level) = args.debug_level {
            self.debug_level = level;
        }
        if let Some(level) = args.verify_input {
            self.verify_input = level;
        }
        if let Some(ref id) = args.client_id {
            self.oauth.client_id = id.clone();
        }
        if let Some(ref secret) = args.client_secret {
            self.oauth.client_secret = Some(SecretString::new(secret.clone()));
        }
        if let Some(ref region) = args.region {
            self.oauth.org_region = region.clone();
        }

        let select = &mut self.select_users;
        if let Some(ref states) = args.include_states {
            select.include = states.clone();
        }
        if let Some(ref by_type) = args.select_by_type {
            select.by_type = by_type.clone();
        }
        if let Some(ref value) = args.select_by_value {
            select.by = "value".to_string();
            select.by_value = value.clone();
        }
        if let Some(ref file) = args.select_by_file {
            select.by = "file".to_string();
            select.by_file = file.display().to_string();
        }
        if let Some(ref format) = args.select_by_file_as {
            select.by_file_as = format.clone();
        }
        if let Some(ref attribute) = args.select_by_file_attribute {
            select.by_file_attribute_name = attribute.clone();
        }
        if let Some(ref file) = args.custom_filter_file {
            select.custom_filter_file = file.display().to_string();
        }
        if let Some(and) = args.filter_conditions_as_and {
            select.filter_conditions_as_and = and;
        }
        if let Some(enabled) = args.enable_post_selection_filter {
            select.enable_post_selection_filter = enabled;
        }
        if let Some(q64) = args.use_q64_pagination {
            select.use_q64_pagination = q64;
        }
        if let Some(search) = args.use_groups_search {
            select.use_groups_search = search;
        }
    }

    /// Apply the subcommand: it sets the action and its own overrides
    pub fn apply_command(&mut self, command: &Commands) {
        match command {
            Commands::Export(args) => {
                self.action = Some(Action::Export.as_str().to_string());
                if let Some(ref format) = args.format {
                    self.export.format = format.clone();
                }
                if let Some(ref file) = args.file {
                    self.export.file = file.clone();
                }
                if let Some(ref resolve) = args.resolve {
                    self.export.resolve = resolve.clone();
                }
                if let Some(ref extended) = args.extended {
                    self.export.extended = extended.clone();
                }
                if let Some(ref include) = args.include {
                    self.export.include = include.clone();
                }
            }
            Commands::UpdateRoles(args) => {
                self.action = Some(Action::UpdateRoles.as_str().to_string());
                if let Some(ref remove) = args.remove {
                    self.update.roles.remove = remove.clone();
                }
                if let Some(ref add) = args.add {
                    self.update.roles.add = add.clone();
                }
            }
            Commands::UpdateAutoAnswer(args) => {
                self.action = Some(Action::UpdateAutoAnswer.as_str().to_string());
                if let Some(ref value) = args.value {
                    self.update.acd_auto_answer.value = value.clone();
                }
            }
            Commands::Test => self.action = Some(Action::Test.as_str().to_string()),
        }
    }

    /// Validate everything the run needs
    pub fn validate(&self) -> CliResult<RunSettings> {
        let action: Action = self
            .action
            .as_deref()
            .ok_or_else(|| CliError::Config("No action given".to_string()))?
            .parse()?;

        let (credentials, region) = self.credentials()?;
        let engine = self.engine_config()?;
        let selection_type: SelectionType = self.select_users.by_type.parse()?;

        let include = parse_include(&self.export.include)?;
        let selection = self.selection_config(selection_type, action, &include)?;
        let input = self.input_source(selection_type)?;

        let post_filter = if self.select_users.enable_post_selection_filter {
            Some(AttributeFilter::from_settings(
                &self.select_users.post_selection_filter,
            )?)
        } else {
            None
        };

        let action = match action {
            Action::Export => ActionPlan::Export {
                options: self.export_options()?,
                profile: ProfileOptions {
                    extended: parse_extended(&self.export.extended)?,
                    resolve: parse_resolve(&self.export.resolve)?,
                    include,
                },
            },
            Action::UpdateRoles => {
                let add = self
                    .update
                    .roles
                    .add
                    .iter()
                    .map(|expression| expression.parse::<RoleGrant>())
                    .collect::<Result<Vec<_>, _>>()?;
                let remove = self
                    .update
                    .roles
                    .remove
                    .iter()
                    .map(|role| role.trim().to_string())
                    .filter(|role| !role.is_empty())
                    .collect();
                ActionPlan::UpdateRoles(RoleUpdateRequest::new(remove, add)?)
            }
            Action::UpdateAutoAnswer => {
                let value = self.update.acd_auto_answer.value.trim();
                if value.is_empty() {
                    return Err(CliError::Config(
                        "update.acdAutoAnswer.value must be provided".to_string(),
                    ));
                }
                ActionPlan::UpdateAutoAnswer(value.parse()?)
            }
            Action::Test => ActionPlan::Test,
        };

        let region_url = |host: &str| format!("https://{}.{}", host, region);
        Ok(RunSettings {
            login_url: self
                .oauth
                .login_url
                .clone()
                .unwrap_or_else(|| region_url("login")),
            api_url: self.oauth.api_url.clone(),
            credentials,
            region,
            engine,
            selection,
            input,
            post_filter,
            action,
        })
    }

    fn credentials(&self) -> CliResult<(ClientCredentials, String)> {
        let oauth = &self.oauth;
        let client_id = oauth.client_id.trim();
        if client_id.is_empty() {
            return Err(CliError::Config("oauth.clientID must be provided".to_string()));
        }
        let secret = oauth
            .client_secret
            .as_ref()
            .map(|s| s.expose_secret().trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CliError::Config("oauth.clientSecret must be provided".to_string()))?;
        let region = oauth.org_region.trim();
        if region.is_empty() {
            return Err(CliError::Config("oauth.orgRegion must be provided".to_string()));
        }
        Ok((ClientCredentials::new(client_id, secret), region.to_string()))
    }

    fn engine_config(&self) -> CliResult<EngineConfig> {
        if self.verify_input > 2 {
            return Err(CliError::Config(format!(
                "verifyInput must be 0, 1 or 2, got {}",
                self.verify_input
            )));
        }
        let engine = self
            .engine
            .clone()
            .with_verbosity(Verbosity::from_debug_level(self.debug_level))
            .with_verify(VerifyInput::from_level(self.verify_input));
        engine.validate().map_err(CliError::Config)?;
        Ok(engine)
    }

    fn selection_config(
        &self,
        selection_type: SelectionType,
        action: Action,
        include: &IncludeFlags,
    ) -> CliResult<SelectionConfig> {
        let select = &self.select_users;

        let states = select
            .include
            .iter()
            .map(|state| state.parse::<EntityState>())
            .collect::<Result<Vec<_>, _>>()?;
        if states.is_empty() {
            return Err(CliError::Config(
                "selectUsers.include must list at least one user state".to_string(),
            ));
        }

        let mut selection = SelectionConfig::new(selection_type)
            .with_include_states(states)
            .with_combination(if select.filter_conditions_as_and {
                FieldCombination::And
            } else {
                FieldCombination::Or
            })
            .with_pagination(if select.use_q64_pagination {
                PaginationProtocol::Cursor
            } else {
                PaginationProtocol::Numbered
            })
            .with_group_method(if select.use_groups_search {
                GroupSearchMethod::Search
            } else {
                GroupSearchMethod::EnumerateAll
            })
            .with_expand(expand_list(
                action,
                select.enable_post_selection_filter,
                include,
            ));

        if selection_type == SelectionType::Custom {
            selection = selection.with_custom_query(self.custom_query()?);
        }

        selection.validate()?;
        Ok(selection)
    }

    /// Read the custom query clauses: an array, or an object with a `query` array
    fn custom_query(&self) -> CliResult<Vec<Value>> {
        let file = self.select_users.custom_filter_file.trim();
        if file.is_empty() {
            return Err(CliError::Config(
                "selectUsers.customFilterFile must be provided for a custom selection".to_string(),
            ));
        }
        let content = std::fs::read_to_string(file)
            .map_err(|e| CliError::Io(format!("Failed to read {}: {}", file, e)))?;
        match serde_json::from_str::<Value>(&content)? {
            Value::Array(clauses) => Ok(clauses),
            Value::Object(mut object) => match object.remove("query") {
                Some(Value::Array(clauses)) => Ok(clauses),
                _ => Err(CliError::Validation(format!(
                    "{} has no query array",
                    file
                ))),
            },
            _ => Err(CliError::Validation(format!(
                "{} must contain an array of query clauses",
                file
            ))),
        }
    }

    fn input_source(&self, selection_type: SelectionType) -> CliResult<InputSource> {
        if selection_type.is_unfiltered() {
            return Ok(InputSource::Unfiltered);
        }
        let select = &self.select_users;
        let separator = single_char(&select.field_separator, "selectUsers.fieldSeparator")?;

        match select.by.as_str() {
            "value" => {
                if select.by_value.trim().is_empty() {
                    return Err(CliError::Config(
                        "selectUsers.byValue must be provided".to_string(),
                    ));
                }
                let separator = if selection_type == SelectionType::Location {
                    selection_type.value_separator()
                } else {
                    separator
                };
                Ok(InputSource::Inline {
                    value: select.by_value.clone(),
                    separator,
                })
            }
            "file" => {
                if select.by_file.trim().is_empty() {
                    return Err(CliError::Config(
                        "selectUsers.byFile must be provided".to_string(),
                    ));
                }
                let attribute = select.by_file_attribute_name.trim();
                if attribute.is_empty() {
                    return Err(CliError::Config(
                        "selectUsers.byFileAttributeName must be provided".to_string(),
                    ));
                }
                Ok(InputSource::File {
                    path: PathBuf::from(select.by_file.trim()),
                    format: select.by_file_as.parse::<InputFormat>()?,
                    attribute: attribute.to_string(),
                    delimiter: ascii_byte(separator, "selectUsers.fieldSeparator")?,
                })
            }
            other => Err(CliError::Config(format!(
                "selectUsers.by must be 'value' or 'file', got '{}'",
                other
            ))),
        }
    }

    fn export_options(&self) -> CliResult<ExportOptions> {
        let file = self.export.file.trim();
        if file.is_empty() {
            return Err(CliError::Config("export.file must be provided".to_string()));
        }
        let separator = single_char(&self.export.field_separator, "export.fieldSeparator")?;
        Ok(ExportOptions {
            format: self.export.format.parse::<ExportFormat>()?,
            file_base: PathBuf::from(file),
            delimiter: ascii_byte(separator, "export.fieldSeparator")?,
        })
    }
}

fn single_char(value: &str, name: &str) -> CliResult<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(CliError::Config(format!(
            "{} must be a single character, got '{}'",
            name, value
        ))),
    }
}

fn ascii_byte(c: char, name: &str) -> CliResult<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| CliError::Config(format!("{} must be an ASCII character", name)))
}

/// Normalize list tokens and report whether `all` was given
fn tokens(values: &[String]) -> (Vec<String>, bool) {
    let tokens: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    let all = tokens.iter().any(|t| t == "all");
    (tokens, all)
}

fn unknown_token(list: &str, token: &str) -> CliError {
    CliError::Validation(format!("Unknown {} value '{}'", list, token))
}

fn parse_resolve(values: &[String]) -> CliResult<ResolveFlags> {
    let (tokens, all) = tokens(values);
    if all {
        return Ok(ResolveFlags {
            locations: true,
            groups: true,
            managers: true,
        });
    }
    let mut flags = ResolveFlags::default();
    for token in &tokens {
        match token.as_str() {
            "locations" => flags.locations = true,
            "groups" => flags.groups = true,
            "managers" => flags.managers = true,
            other => return Err(unknown_token("export.resolve", other)),
        }
    }
    Ok(flags)
}

fn parse_extended(values: &[String]) -> CliResult<ExtendedFlags> {
    let (tokens, all) = tokens(values);
    if all {
        return Ok(ExtendedFlags {
            queues: true,
            direct_reports: true,
            managers: true,
            phone_alert_timeouts: true,
            roles_divisions: true,
        });
    }
    let mut flags = ExtendedFlags::default();
    for token in &tokens {
        match token.as_str() {
            "queues" => flags.queues = true,
            "directreports" => flags.direct_reports = true,
            "managers" => flags.managers = true,
            "phonealerttimeouts" => flags.phone_alert_timeouts = true,
            "rolesdivisions" => flags.roles_divisions = true,
            other => return Err(unknown_token("export.extended", other)),
        }
    }
    Ok(flags)
}

fn parse_include(values: &[String]) -> CliResult<IncludeFlags> {
    let (tokens, all) = tokens(values);
    if all {
        return Ok(IncludeFlags {
            roles: true,
            profile_skills: true,
            certifications: true,
            locations: true,
            groups: true,
            skills: true,
            languages: true,
            language_preference: true,
            hr: true,
            biography: true,
        });
    }
    let mut flags = IncludeFlags::default();
    for token in &tokens {
        match token.as_str() {
            "roles" => flags.roles = true,
            "profileskills" => flags.profile_skills = true,
            "certifications" => flags.certifications = true,
            "locations" => flags.locations = true,
            "groups" => flags.groups = true,
            "skills" => flags.skills = true,
            "languages" => flags.languages = true,
            "languagepreference" => flags.language_preference = true,
            "hr" => flags.hr = true,
            "biography" => flags.biography = true,
            other => return Err(unknown_token("export.include", other)),
        }
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ExportArgs, UpdateRolesArgs};
    use gcusers_engine::{DivisionSpec, EngineError};
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({
            "action": "test",
            "oauth": {
                "clientID": "client",
                "clientSecret": "secret",
                "orgRegion": "mypurecloud.ie"
            },
            "selectUsers": {
                "byType": "email",
                "by": "value",
                "byValue": "Jane@example.com"
            }
        })
    }

    fn settings(document: serde_json::Value) -> ToolSettings {
        ToolSettings::from_json(&document.to_string()).unwrap()
    }

    #[test]
    fn test_defaults() {
        let s = settings(base());
        let run = s.validate().unwrap();

        assert_eq!(run.region, "mypurecloud.ie");
        assert_eq!(run.login_url, "https://login.mypurecloud.ie");
        assert_eq!(run.credentials.client_id, "client");
        assert_eq!(run.engine.verify, VerifyInput::Off);
        assert_eq!(run.engine.verbosity, Verbosity::Normal);
        assert_eq!(run.selection.pagination, PaginationProtocol::Cursor);
        assert_eq!(run.selection.group_method, GroupSearchMethod::EnumerateAll);
        assert_eq!(
            run.selection.include_states,
            vec![EntityState::Active, EntityState::Inactive]
        );
        assert!(run.selection.expand.is_empty());
        assert_eq!(
            run.input,
            InputSource::Inline {
                value: "Jane@example.com".to_string(),
                separator: ','
            }
        );
        assert!(matches!(run.action, ActionPlan::Test));
    }

    #[test]
    fn test_missing_credentials() {
        let mut document = base();
        document["oauth"]["clientSecret"] = json!("");
        let result = settings(document).validate();
        assert!(matches!(result, Err(CliError::Config(ref m)) if m.contains("clientSecret")));
    }

    #[test]
    fn test_and_combination_support() {
        let mut document = base();
        document["selectUsers"]["filterConditionsAsAnd"] = json!(true);
        let result = settings(document).validate();
        assert!(matches!(result, Err(CliError::Engine(EngineError::Config(_)))));

        let mut document = base();
        document["selectUsers"]["byType"] = json!("skill");
        document["selectUsers"]["byValue"] = json!("French,Spanish");
        document["selectUsers"]["filterConditionsAsAnd"] = json!(true);
        let run = settings(document).validate().unwrap();
        assert_eq!(run.selection.combination, FieldCombination::And);
    }

    #[test]
    fn test_location_uses_pipe_separator() {
        let mut document = base();
        document["selectUsers"]["byType"] = json!("location");
        document["selectUsers"]["byValue"] = json!("Paris, France|Lyon");
        let run = settings(document).validate().unwrap();
        assert!(matches!(run.input, InputSource::Inline { separator: '|', .. }));
    }

    #[test]
    fn test_unfiltered_selection_needs_no_input() {
        let mut document = base();
        document["selectUsers"] = json!({ "byType": "all" });
        let run = settings(document).validate().unwrap();
        assert_eq!(run.input, InputSource::Unfiltered);
    }

    #[test]
    fn test_custom_selection_reads_filter_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(
            &path,
            json!({ "query": [{ "fields": ["department"], "values": ["Sales"], "type": "EXACT" }] })
                .to_string(),
        )
        .unwrap();

        let mut document = base();
        document["selectUsers"] = json!({
            "byType": "custom",
            "customFilterFile": path.display().to_string()
        });
        let run = settings(document).validate().unwrap();
        assert_eq!(run.selection.custom_query.as_ref().map(Vec::len), Some(1));

        let mut document = base();
        document["selectUsers"] = json!({ "byType": "custom" });
        assert!(matches!(settings(document).validate(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_file_input_requires_attribute() {
        let mut document = base();
        document["selectUsers"] = json!({
            "byType": "email",
            "by": "file",
            "byFile": "users.csv",
            "byFileAs": "csv"
        });
        assert!(matches!(settings(document).validate(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_args_override_file() {
        let mut s = settings(base());
        s.apply_args(&GlobalArgs {
            debug_level: Some(2),
            verify_input: Some(2),
            region: Some("usw2.pure.cloud".to_string()),
            select_by_type: Some("name".to_string()),
            select_by_value: Some("Jane Doe".to_string()),
            use_q64_pagination: Some(false),
            use_groups_search: Some(true),
            ..GlobalArgs::default()
        });
        let run = s.validate().unwrap();

        assert_eq!(run.engine.verbosity, Verbosity::Debug);
        assert_eq!(run.engine.verify, VerifyInput::Strict);
        assert_eq!(run.region, "usw2.pure.cloud");
        assert_eq!(run.selection.selection_type, SelectionType::Name);
        assert_eq!(run.selection.pagination, PaginationProtocol::Numbered);
        assert_eq!(run.selection.group_method, GroupSearchMethod::Search);
    }

    #[test]
    fn test_update_roles_command() {
        let mut s = settings(base());
        s.apply_command(&Commands::UpdateRoles(UpdateRolesArgs {
            remove: Some(vec!["Supervisor".to_string()]),
            add: Some(vec!["Agent(@Home;@User)".to_string()]),
        }));
        let run = s.validate().unwrap();

        let ActionPlan::UpdateRoles(request) = run.action else {
            panic!("expected a role update");
        };
        assert_eq!(request.remove(), ["Supervisor".to_string()]);
        assert_eq!(
            request.add()[0].divisions,
            vec![DivisionSpec::Home, DivisionSpec::OwnUser]
        );
        assert_eq!(run.selection.expand, vec!["authorization".to_string()]);
    }

    #[test]
    fn test_invalid_role_expression() {
        let mut s = settings(base());
        s.apply_command(&Commands::UpdateRoles(UpdateRolesArgs {
            remove: None,
            add: Some(vec!["Agent".to_string()]),
        }));
        assert!(matches!(s.validate(), Err(CliError::Engine(EngineError::Config(_)))));
    }

    #[test]
    fn test_auto_answer_value_required() {
        let mut document = base();
        document["action"] = json!("updateACDAutoAnswer");
        assert!(matches!(settings(document).validate(), Err(CliError::Config(_))));

        let mut document = base();
        document["action"] = json!("updateACDAutoAnswer");
        document["update"] = json!({ "acdAutoAnswer": { "value": "forceTrue" } });
        let run = settings(document).validate().unwrap();
        assert!(matches!(
            run.action,
            ActionPlan::UpdateAutoAnswer(AttributeToggle { value: true, force: true })
        ));
    }

    #[test]
    fn test_export_command() {
        let mut s = settings(base());
        s.apply_command(&Commands::Export(ExportArgs {
            format: Some("csv".to_string()),
            file: Some("./out/users".to_string()),
            resolve: Some(vec!["Locations".to_string(), "Managers".to_string()]),
            extended: Some(vec!["all".to_string()]),
            include: Some(vec!["Locations".to_string(), "HR".to_string()]),
        }));
        let run = s.validate().unwrap();

        let ActionPlan::Export { options, profile } = run.action else {
            panic!("expected an export");
        };
        assert_eq!(options.format, ExportFormat::Csv);
        assert_eq!(options.path(), PathBuf::from("./out/users.csv"));
        assert!(profile.resolves_locations());
        assert!(profile.resolves_managers());
        assert!(!profile.resolves_groups());
        assert!(profile.extended.queues && profile.extended.roles_divisions);
        assert_eq!(
            run.selection.expand,
            vec!["locations".to_string(), "employerInfo".to_string()]
        );
    }

    #[test]
    fn test_unknown_export_list_value() {
        let mut document = base();
        document["action"] = json!("export");
        document["export"] = json!({ "resolve": ["Planets"] });
        assert!(matches!(settings(document).validate(), Err(CliError::Validation(_))));
    }

    #[test]
    fn test_missing_action() {
        let mut document = base();
        document.as_object_mut().unwrap().remove("action");
        assert!(matches!(settings(document).validate(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_engine_block() {
        let mut document = base();
        document["engine"] = json!({ "bulkSize": 0 });
        assert!(matches!(settings(document).validate(), Err(CliError::Config(_))));

        let mut document = base();
        document["engine"] = json!({ "pageSize": 100, "dedup": "always" });
        let run = settings(document).validate().unwrap();
        assert_eq!(run.engine.page_size, 100);
        assert_eq!(run.engine.pacing_delay_ms, 100);
    }
}
