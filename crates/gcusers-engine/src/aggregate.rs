//! Paginated aggregator.
//!
//! Drains every page of a search, chunks criteria into windows of the
//! stage's values-per-query limit, merges windows under the configured
//! dedup policy and optionally verifies that every input value resolved.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use crate::page::{PageFetcher, PageToken};
use crate::settings::{GroupSearchMethod, ResourceKind, SearchSettings};
use crate::{DedupPolicy, EngineConfig, EngineError, EngineResult, Verbosity, VerifyInput};

/// One selection value: an email, a name, an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchCriterion {
    pub id: String,
}

impl SearchCriterion {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Criteria built from the `id` of each entity, in order.
    #[must_use]
    pub fn from_entities(entities: &[Value]) -> Vec<Self> {
        entities
            .iter()
            .filter_map(|entity| entity_id(entity))
            .map(Self::new)
            .collect()
    }
}

impl From<&str> for SearchCriterion {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SearchCriterion {
    fn from(id: String) -> Self {
        Self { id }
    }
}

/// `id` of an entity record, if it is a string.
#[must_use]
pub fn entity_id(entity: &Value) -> Option<&str> {
    entity.get("id").and_then(Value::as_str)
}

/// Drains searches and merges their results.
#[derive(Debug, Clone)]
pub struct Aggregator {
    fetcher: PageFetcher,
    dedup: DedupPolicy,
    verify: VerifyInput,
    verbosity: Verbosity,
}

impl Aggregator {
    pub fn new(fetcher: PageFetcher, config: &EngineConfig) -> Self {
        Self {
            fetcher,
            dedup: config.dedup,
            verify: config.verify,
            verbosity: config.verbosity,
        }
    }

    #[must_use]
    pub fn fetcher(&self) -> &PageFetcher {
        &self.fetcher
    }

    #[must_use]
    pub fn verify(&self) -> VerifyInput {
        self.verify
    }

    /// Returns a copy using a different verification mode.
    #[must_use]
    pub fn with_verify(&self, verify: VerifyInput) -> Self {
        Self {
            verify,
            ..self.clone()
        }
    }

    /// Fetches every page of one query.
    ///
    /// # Errors
    ///
    /// Any failed page fails the whole drain; partial results are dropped.
    pub async fn drain(&self, settings: &SearchSettings, values: &[String]) -> EngineResult<Vec<Value>> {
        let mut results = Vec::new();
        let mut token = Some(PageToken::first());

        while let Some(current) = token {
            let page = self.fetcher.fetch_page(settings, values, &current).await?;
            results.extend(page.items);
            token = page.continuation.into_token();
        }

        Ok(results)
    }

    /// Resolves `criteria` through one stage.
    ///
    /// # Errors
    ///
    /// Fails when the input exceeds the stage limit, when any page fails, or
    /// on a verification mismatch under strict verification.
    #[instrument(skip(self, criteria, settings), fields(resource = %settings.kind(), inputs = criteria.len()))]
    pub async fn aggregate_all(
        &self,
        criteria: &[SearchCriterion],
        settings: &SearchSettings,
    ) -> EngineResult<Vec<Value>> {
        let kind = settings.kind();

        if criteria.len() > settings.max_items() {
            return Err(EngineError::SearchListTooLarge {
                resource: kind.to_string(),
                count: criteria.len(),
                max: settings.max_items(),
            });
        }

        let results = if kind == ResourceKind::Divisions && criteria.is_empty() {
            self.drain(settings, &[]).await?
        } else if settings.group_method() == Some(GroupSearchMethod::EnumerateAll) {
            self.enumerate_groups(criteria, settings).await?
        } else {
            self.aggregate_windows(criteria, settings).await?
        };

        if self.verbosity.log_details() {
            debug!(
                requested = criteria.len(),
                resolved = results.len(),
                "Searched {kind}"
            );
        }
        if self.verbosity.log_values() {
            let inputs: Vec<&str> = criteria.iter().map(|c| c.id.as_str()).collect();
            let dump = serde_json::Value::Array(results.clone());
            debug!(?inputs, results = %dump, "Search values");
        }

        self.verify_results(criteria, &results, kind)?;
        Ok(results)
    }

    async fn aggregate_windows(
        &self,
        criteria: &[SearchCriterion],
        settings: &SearchSettings,
    ) -> EngineResult<Vec<Value>> {
        let kind = settings.kind();
        let mut merger = WindowMerger::new(self.dedup);

        for (window, chunk) in criteria.chunks(settings.max_values()).enumerate() {
            let values: Vec<String> = chunk.iter().map(|c| c.id.clone()).collect();
            let found = self.drain(settings, &values).await?;

            if found.is_empty() {
                debug!(window = window, "No {kind} found for window");
                continue;
            }

            if kind.is_name_validation() {
                merger.push_names(found);
            } else {
                merger.push_window(window, found);
            }
        }

        Ok(merger.finish())
    }

    /// Fetches the whole group catalog and keeps groups matching the criteria
    /// by `name` or by `id`, depending on the stage fields.
    async fn enumerate_groups(
        &self,
        criteria: &[SearchCriterion],
        settings: &SearchSettings,
    ) -> EngineResult<Vec<Value>> {
        let key = if settings.fields().iter().any(|f| f == "name") {
            "name"
        } else {
            "id"
        };
        let wanted: HashSet<&str> = criteria.iter().map(|c| c.id.as_str()).collect();

        let catalog = self.drain(settings, &[]).await?;
        Ok(catalog
            .into_iter()
            .filter(|group| {
                group
                    .get(key)
                    .and_then(Value::as_str)
                    .is_some_and(|value| wanted.contains(value))
            })
            .collect())
    }

    fn verify_results(
        &self,
        criteria: &[SearchCriterion],
        results: &[Value],
        kind: ResourceKind,
    ) -> EngineResult<()> {
        if !self.verify.is_enabled()
            || !kind.is_verifiable()
            || criteria.is_empty()
            || criteria.len() == results.len()
        {
            return Ok(());
        }

        let join_key = if kind.is_name_validation() { "id" } else { "name" };
        let resolved: HashSet<&str> = results
            .iter()
            .filter_map(|r| r.get(join_key).and_then(Value::as_str))
            .collect();
        let unknown: Vec<String> = criteria
            .iter()
            .filter(|c| !resolved.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect();

        warn!(
            resource = %kind,
            requested = criteria.len(),
            resolved = results.len(),
            ?unknown,
            "Input verification: number of input values does not match the number of results"
        );

        if self.verify == VerifyInput::Strict {
            return Err(EngineError::VerificationMismatch {
                resource: kind.to_string(),
                requested: criteria.len(),
                resolved: results.len(),
                unknown,
            });
        }
        Ok(())
    }
}

/// Accumulates windows under a dedup policy.
struct WindowMerger {
    policy: DedupPolicy,
    seen: HashSet<String>,
    results: Vec<Value>,
}

impl WindowMerger {
    fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            seen: HashSet::new(),
            results: Vec::new(),
        }
    }

    fn push_window(&mut self, window: usize, found: Vec<Value>) {
        let dedup = match self.policy {
            DedupPolicy::Disabled => false,
            DedupPolicy::SkipFirstWindow => window > 0,
            DedupPolicy::Always => true,
        };

        for entity in found {
            let id = entity_id(&entity).map(str::to_string);
            if let Some(id) = id {
                let fresh = self.seen.insert(id.clone());
                if dedup && !fresh {
                    if self.policy == DedupPolicy::Always {
                        info!(id = %id, "Duplicate found, ignoring");
                    }
                    continue;
                }
            }
            self.results.push(entity);
        }
    }

    /// Re-keys validation hits as `{id: name}`, always deduplicated.
    fn push_names(&mut self, found: Vec<Value>) {
        for entity in found {
            if let Some(name) = entity.get("name").and_then(Value::as_str) {
                if self.seen.insert(name.to_string()) {
                    self.results.push(json!({ "id": name }));
                }
            }
        }
    }

    fn finish(self) -> Vec<Value> {
        self.results
    }
}
