//! Command implementations
//!
//! Every action shares the same front half: load the input, log in, run the
//! selection pipeline and apply the optional post-selection filter. Only the
//! last step differs per action.

pub mod export;
pub mod update_auto_answer;
pub mod update_roles;

use gcusers_engine::{
    apply_filter, Aggregator, BearerSession, EngineConfig, HttpTransport, PageFetcher,
    RequestExecutor, RoleUpdateTally, SelectionPipeline, ToggleTally, Transport,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::cli::Cli;
use crate::error::CliResult;
use crate::export::ExportSummary;
use crate::input::load_criteria;
use crate::logging;
use crate::settings::{ActionPlan, RunSettings, ToolSettings};

/// What a run did
#[derive(Debug)]
pub struct RunReport {
    pub selected: usize,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub enum Outcome {
    Exported(ExportSummary),
    RolesUpdated(RoleUpdateTally),
    AutoAnswerUpdated(ToggleTally),
    Tested,
}

/// Load settings, apply arguments and run the configured action
pub async fn run(cli: Cli) -> CliResult<RunReport> {
    let mut settings = ToolSettings::load(cli.global.settings.as_deref())?;
    settings.apply_args(&cli.global);
    if let Some(ref command) = cli.command {
        settings.apply_command(command);
    }

    let run = settings.validate()?;
    logging::init(run.engine.verbosity);
    execute(run).await
}

/// Run validated settings end to end
pub async fn execute(run: RunSettings) -> CliResult<RunReport> {
    let action = run.action.action();
    info!(
        action = action.as_str(),
        selection = %run.selection.selection_type,
        "Starting run"
    );

    let criteria = load_criteria(run.selection.selection_type, &run.input)?;

    let session = BearerSession::acquire_from(&run.login_url, &run.region, &run.credentials).await?;
    let transport = transport(&session, run.api_url.as_deref())?;
    let executor = RequestExecutor::new(transport, &run.engine);
    let aggregator = Aggregator::new(PageFetcher::new(executor.clone(), run.engine.page_size), &run.engine);

    let pipeline = SelectionPipeline::new(aggregator.clone(), run.selection.clone());
    let mut users = pipeline.run(criteria).await?;
    info!(count = users.len(), "Users selected");

    if let Some(ref filter) = run.post_filter {
        users = apply_filter(users, filter)?;
    }
    let selected = users.len();

    let context = ActionContext {
        aggregator,
        executor,
        run: &run,
    };
    let outcome = match run.action {
        ActionPlan::Export {
            ref options,
            ref profile,
        } => Outcome::Exported(export::execute(&context, users, options, profile).await?),
        ActionPlan::UpdateRoles(ref request) => {
            Outcome::RolesUpdated(update_roles::execute(&context, &users, request).await?)
        }
        ActionPlan::UpdateAutoAnswer(toggle) => {
            Outcome::AutoAnswerUpdated(update_auto_answer::execute(&context, &users, toggle).await?)
        }
        ActionPlan::Test => {
            info!(count = selected, "Test completed, no changes applied");
            Outcome::Tested
        }
    };

    Ok(RunReport { selected, outcome })
}

/// Shared handles for the action step
pub struct ActionContext<'a> {
    pub aggregator: Aggregator,
    pub executor: RequestExecutor,
    pub run: &'a RunSettings,
}

impl ActionContext<'_> {
    pub fn config(&self) -> &EngineConfig {
        &self.run.engine
    }
}

fn transport(session: &BearerSession, api_url: Option<&str>) -> CliResult<Arc<dyn Transport>> {
    let transport = match api_url {
        Some(url) => HttpTransport::with_base_url(
            Url::parse(url).map_err(gcusers_engine::EngineError::from)?,
            SecretString::new(session.access_token().expose_secret().clone()),
        )?,
        None => HttpTransport::new(session)?,
    };
    Ok(Arc::new(transport))
}
