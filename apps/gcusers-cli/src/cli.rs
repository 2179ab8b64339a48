//! Command-line arguments
//!
//! Every argument overrides the matching settings-file value.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// gcusers - Select directory users and export or bulk-update them
#[derive(Debug, Parser)]
#[command(name = "gcusers")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Action to run; defaults to the settings-file action
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Export the selected users to a JSON or CSV file
    Export(ExportArgs),

    /// Revoke and grant roles on the selected users
    UpdateRoles(UpdateRolesArgs),

    /// Set ACD auto-answer on the selected users
    UpdateAutoAnswer(UpdateAutoAnswerArgs),

    /// Select users and report the count, without changes
    Test,
}

/// Settings and selection overrides shared by every action
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// JSON settings file
    #[arg(long, short = 's', env = "GCUSERS_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    /// 0: progress, 1: details, 2: values and attempt timestamps
    #[arg(long, global = true)]
    pub debug_level: Option<u8>,

    /// 0: off, 1: warn on unknown input values, 2: abort on unknown input values
    #[arg(long, global = true)]
    pub verify_input: Option<u8>,

    /// OAuth client id
    #[arg(long, env = "GCUSERS_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "GCUSERS_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub client_secret: Option<String>,

    /// Org region, e.g. mypurecloud.ie
    #[arg(long, env = "GCUSERS_REGION", global = true)]
    pub region: Option<String>,

    /// User states to include (active, inactive, deleted)
    #[arg(long, value_delimiter = ',', global = true)]
    pub include_states: Option<Vec<String>>,

    /// Selection type (email, role, group, skill, ...)
    #[arg(long, global = true)]
    pub select_by_type: Option<String>,

    /// Inline selection values, comma separated (pipe separated for locations)
    #[arg(long, global = true, conflicts_with = "select_by_file")]
    pub select_by_value: Option<String>,

    /// Selection input file
    #[arg(long, global = true)]
    pub select_by_file: Option<PathBuf>,

    /// Selection input file format (json, jsonArray, jsonMap, csv)
    #[arg(long, global = true)]
    pub select_by_file_as: Option<String>,

    /// Attribute or column holding the selection values
    #[arg(long, global = true)]
    pub select_by_file_attribute: Option<String>,

    /// JSON file with the custom query clauses
    #[arg(long, global = true)]
    pub custom_filter_file: Option<PathBuf>,

    /// Combine selection values with AND instead of OR
    #[arg(long, global = true)]
    pub filter_conditions_as_and: Option<bool>,

    /// Apply the post-selection filter of the settings file
    #[arg(long, global = true)]
    pub enable_post_selection_filter: Option<bool>,

    /// Continue users searches with q64 cursors
    #[arg(long, global = true)]
    pub use_q64_pagination: Option<bool>,

    /// Look groups up through the search endpoint instead of enumerating them
    #[arg(long, global = true)]
    pub use_groups_search: Option<bool>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ExportArgs {
    /// Export format (json, csv, jsonArray, jsonMap)
    #[arg(long = "as")]
    pub format: Option<String>,

    /// Export file name, without extension
    #[arg(long)]
    pub file: Option<String>,

    /// References to resolve (all, Locations, Groups, Managers)
    #[arg(long, value_delimiter = ',')]
    pub resolve: Option<Vec<String>>,

    /// Per-user data to add (all, Queues, DirectReports, Managers, PhoneAlertTimeouts, RolesDivisions)
    #[arg(long, value_delimiter = ',')]
    pub extended: Option<Vec<String>>,

    /// User attributes to include (all, HR, Biography, ProfileSkills, ...)
    #[arg(long, value_delimiter = ',')]
    pub include: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct UpdateRolesArgs {
    /// Role names to revoke
    #[arg(long, value_delimiter = ',')]
    pub remove: Option<Vec<String>>,

    /// Roles to grant, as role(division;division); @Home and @User are supported
    #[arg(long, value_delimiter = ',')]
    pub add: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct UpdateAutoAnswerArgs {
    /// true, false, forceTrue or forceFalse
    #[arg(long)]
    pub value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_update_roles() {
        let cli = Cli::try_parse_from([
            "gcusers",
            "update-roles",
            "--remove",
            "Supervisor,Admin",
            "--add",
            "Agent(@Home;Sales)",
            "--select-by-type",
            "email",
            "--select-by-value",
            "a@example.com",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::UpdateRoles(args)) => {
                assert_eq!(
                    args.remove,
                    Some(vec!["Supervisor".to_string(), "Admin".to_string()])
                );
                assert_eq!(args.add, Some(vec!["Agent(@Home;Sales)".to_string()]));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.global.select_by_type.as_deref(), Some("email"));
    }

    #[test]
    fn test_parse_without_subcommand() {
        let cli = Cli::try_parse_from(["gcusers", "--settings", "tool.json", "--debug-level", "2"])
            .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.global.debug_level, Some(2));
    }

    #[test]
    fn test_value_and_file_conflict() {
        let result = Cli::try_parse_from([
            "gcusers",
            "test",
            "--select-by-value",
            "a",
            "--select-by-file",
            "input.csv",
        ]);
        assert!(result.is_err());
    }
}
