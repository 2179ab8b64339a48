//! Entity resolution and bulk mutation engine for a paginated,
//! rate-limited directory API.
//!
//! The engine turns selection criteria (emails, role names, group names,
//! skills, ...) into user records through one or more dependent search
//! stages, then optionally extends those records or applies bulk updates.
//!
//! # Features
//!
//! - Server-directed retries on 429 with a fixed attempt ceiling
//! - Numbered-page and opaque-cursor (`q64`) pagination
//! - Criteria windowing with configurable deduplication
//! - Multi-stage selection pipelines (role → members → users, ...)
//! - Batched attribute toggles and division-scoped role grants/revokes
//! - Per-user profile extension and set-based reference resolution
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gcusers_engine::{
//!     Aggregator, BearerSession, ClientCredentials, EngineConfig, HttpTransport, PageFetcher,
//!     RequestExecutor, SelectionConfig, SelectionPipeline, SelectionType,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = ClientCredentials::new("client-id", "client-secret");
//! let session = BearerSession::acquire("mypurecloud.com", &credentials).await?;
//!
//! let config = EngineConfig::default();
//! let executor = RequestExecutor::new(Arc::new(HttpTransport::new(&session)?), &config);
//! let aggregator = Aggregator::new(PageFetcher::new(executor, config.page_size), &config);
//!
//! let pipeline = SelectionPipeline::new(aggregator, SelectionConfig::new(SelectionType::Email));
//! let users = pipeline.run(vec!["jane@example.com".into()]).await?;
//! println!("selected {} users", users.len());
//! # Ok(())
//! # }
//! ```

mod aggregate;
mod auth;
mod batcher;
mod config;
mod error;
mod executor;
mod page;
mod pipeline;
mod profile;
mod roles;
mod settings;
mod transport;

#[cfg(test)]
mod testing;

// Re-exports
pub use aggregate::{entity_id, Aggregator, SearchCriterion};
pub use auth::{BearerSession, ClientCredentials};
pub use batcher::{AttributeToggle, BulkBatcher, RoleUpdateTally, ToggleTally};
pub use config::{DedupPolicy, EngineConfig, Verbosity, VerifyInput};
pub use error::{EngineError, EngineResult};
pub use executor::{parse_retry_after, RequestExecutor, RetryState};
pub use page::{build_search_body, extract_cursor, normalize_page, Continuation, Page, PageFetcher, PageToken};
pub use pipeline::{
    apply_filter, expand_list, Action, IncludeFlags, ResolveTarget, SelectionConfig,
    SelectionFilter, SelectionPipeline, SelectionType,
};
pub use profile::{ExtendedFlags, ProfileOptions, ProfileResolver, ResolveFlags};
pub use roles::{
    BulkRoleUpdatePlan, DivisionDirectory, DivisionSpec, RoleDirectory, RoleGrant, RoleGrantBatch,
    RoleRevoke, RoleUpdateRequest,
};
pub use settings::{
    EntityState, FieldCombination, GroupSearchMethod, PaginationProtocol, ResourceKind,
    SearchSettings, SearchSettingsBuilder, SearchTarget, MAX_QUERY_CLAUSES,
};
pub use transport::{ApiRequest, ApiResponse, Clock, HttpTransport, TokioClock, Transport};
