//! Page fetcher: builds one page request per resource kind, sends it
//! through the executor and normalizes the response.

use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::settings::{
    FieldCombination, GroupSearchMethod, PaginationProtocol, SearchSettings, SearchTarget,
    MAX_QUERY_CLAUSES,
};
use crate::transport::ApiRequest;
use crate::{EngineError, EngineResult, RequestExecutor};

/// Where the next page comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Last page.
    None,
    /// Opaque cursor for the next request.
    Cursor(String),
    /// Next page index.
    NextIndex(u32),
}

/// One normalized page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub continuation: Continuation,
}

/// Which page to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    Index(u32),
    Cursor(String),
}

impl PageToken {
    #[must_use]
    pub fn first() -> Self {
        Self::Index(1)
    }
}

impl Continuation {
    /// Token for the next request, `None` on the last page.
    #[must_use]
    pub fn into_token(self) -> Option<PageToken> {
        match self {
            Continuation::None => None,
            Continuation::Cursor(cursor) => Some(PageToken::Cursor(cursor)),
            Continuation::NextIndex(index) => Some(PageToken::Index(index)),
        }
    }
}

/// Extracts and URL-decodes the `q64` parameter of a `nextPage` reference.
#[must_use]
pub fn extract_cursor(next_page: &str) -> Option<String> {
    let query = match next_page.find("search?") {
        Some(start) => &next_page[start + "search?".len()..],
        None => next_page.split_once('?').map_or(next_page, |(_, q)| q),
    };

    query
        .split('&')
        .filter_map(|param| param.strip_prefix("q64="))
        .last()
        .and_then(|raw| urlencoding::decode(raw).ok())
        .map(|decoded| decoded.into_owned())
        .filter(|cursor| !cursor.is_empty())
}

/// Builds the JSON body of a numbered search request.
#[must_use]
pub fn build_search_body(
    settings: &SearchSettings,
    values: &[String],
    page_number: u32,
    page_size: u32,
) -> Value {
    let mut query: Vec<Value> = Vec::new();

    if let Some(custom) = settings.custom_query() {
        query.extend(custom.iter().take(MAX_QUERY_CLAUSES).cloned());
    } else if !settings.fields().is_empty() && !values.is_empty() {
        match settings.combination() {
            FieldCombination::Or => query.push(json!({
                "fields": settings.fields(),
                "values": values,
                "type": "EXACT"
            })),
            FieldCombination::And => {
                for value in values {
                    query.push(json!({
                        "fields": settings.fields(),
                        "value": value,
                        "type": "EXACT"
                    }));
                }
            }
        }
    }

    if !settings.include_states().is_empty() {
        let states: Vec<&str> = settings
            .include_states()
            .iter()
            .map(|s| s.as_str())
            .collect();
        query.push(json!({
            "fields": ["state"],
            "values": states,
            "type": "EXACT"
        }));
    }

    let mut body = json!({
        "pageNumber": page_number,
        "pageSize": page_size,
        "sortOrder": "ASC",
        "sortBy": "id",
        "query": query
    });
    if !settings.expand().is_empty() {
        body["expand"] = json!(settings.expand());
    }
    body
}

/// Issues single pages for a stage.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    executor: RequestExecutor,
    page_size: u32,
}

impl PageFetcher {
    pub fn new(executor: RequestExecutor, page_size: u32) -> Self {
        Self {
            executor,
            page_size,
        }
    }

    #[must_use]
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Fetches and normalizes one page.
    ///
    /// # Errors
    ///
    /// Propagates executor failures; a `null` or malformed page is fatal.
    #[instrument(skip(self, settings, values), fields(resource = %settings.kind()))]
    pub async fn fetch_page(
        &self,
        settings: &SearchSettings,
        values: &[String],
        token: &PageToken,
    ) -> EngineResult<Page> {
        let request = self.build_request(settings, values, token)?;
        let body = self.executor.execute(&request).await?;
        let page = normalize_page(settings, token, body)?;
        debug!(
            items = page.items.len(),
            continuation = ?page.continuation,
            "Page fetched"
        );
        Ok(page)
    }

    /// Builds the request for one page.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for a cursor token on a listing
    /// endpoint, or a role-member lookup without exactly one role id.
    pub fn build_request(
        &self,
        settings: &SearchSettings,
        values: &[String],
        token: &PageToken,
    ) -> EngineResult<ApiRequest> {
        let page_number = match token {
            PageToken::Index(index) => *index,
            PageToken::Cursor(cursor) => return cursor_request(settings, cursor),
        };
        let names = values.join(",");

        let request = match settings.target() {
            SearchTarget::Users { .. } => ApiRequest::post("/api/v2/users/search").json(
                build_search_body(settings, values, page_number, self.page_size),
            ),
            SearchTarget::Groups {
                method: GroupSearchMethod::EnumerateAll,
                ..
            } => ApiRequest::get("/api/v2/groups")
                .query("pageSize", self.page_size)
                .query("pageNumber", page_number)
                .query("sortOrder", "ASC"),
            SearchTarget::Groups { .. } => ApiRequest::post("/api/v2/groups/search").json(
                build_search_body(settings, values, page_number, self.page_size),
            ),
            SearchTarget::Locations { .. } => ApiRequest::post("/api/v2/locations/search").json(
                build_search_body(settings, values, page_number, self.page_size),
            ),
            SearchTarget::Skills => self
                .listing("/api/v2/routing/skills", page_number)
                .query("name", names),
            SearchTarget::Languages => self
                .listing("/api/v2/routing/languages", page_number)
                .query("sortOrder", "ASC")
                .query("name", names),
            SearchTarget::Roles => self
                .listing("/api/v2/authorization/roles", page_number)
                .query("name", names),
            SearchTarget::Divisions => {
                let request = self.listing("/api/v2/authorization/divisions", page_number);
                if names.is_empty() {
                    request
                } else {
                    request.query("name", names)
                }
            }
            SearchTarget::RoleMembers => {
                let [role_id] = values else {
                    return Err(EngineError::Config(format!(
                        "roleMembers: expected one role id per query, got {}",
                        values.len()
                    )));
                };
                self.listing(
                    format!("/api/v2/authorization/roles/{role_id}/users"),
                    page_number,
                )
            }
        };

        Ok(request)
    }

    fn listing(&self, path: impl Into<String>, page_number: u32) -> ApiRequest {
        ApiRequest::get(path)
            .query("pageSize", self.page_size)
            .query("pageNumber", page_number)
    }
}

/// GET request continuing a search from an opaque cursor.
fn cursor_request(settings: &SearchSettings, cursor: &str) -> EngineResult<ApiRequest> {
    let path = match settings.target() {
        SearchTarget::Users { .. } => "/api/v2/users/search",
        SearchTarget::Locations { .. } => "/api/v2/locations/search",
        SearchTarget::Groups {
            method: GroupSearchMethod::Search,
            ..
        } => "/api/v2/groups/search",
        _ => {
            return Err(EngineError::Config(format!(
                "{}: cursor pagination is not supported",
                settings.kind()
            )))
        }
    };

    let mut request = ApiRequest::get(path).query("q64", cursor);
    for expand in settings.expand() {
        request = request.query("expand", expand);
    }
    Ok(request)
}

/// Normalizes a raw page body into [`Page`].
///
/// Items come from `results` or `entities`. Under cursor pagination the
/// presence of `nextPage` decides continuation; otherwise `pageCount`.
///
/// # Errors
///
/// A `null` body, or a `nextPage` without a cursor, is fatal.
pub fn normalize_page(
    settings: &SearchSettings,
    token: &PageToken,
    body: Value,
) -> EngineResult<Page> {
    let kind = settings.kind();
    let Value::Object(mut object) = body else {
        return Err(EngineError::UnexpectedResponse {
            resource: kind.to_string(),
            detail: "page body is not an object".to_string(),
        });
    };

    let items = match object.remove("results") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => match object.remove("entities") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
    };

    let continuation = match settings.pagination() {
        PaginationProtocol::Cursor => match object.get("nextPage").and_then(Value::as_str) {
            Some(next_page) => {
                let cursor =
                    extract_cursor(next_page).ok_or_else(|| EngineError::UnexpectedResponse {
                        resource: kind.to_string(),
                        detail: format!("nextPage without q64 cursor: {next_page}"),
                    })?;
                Continuation::Cursor(cursor)
            }
            None => Continuation::None,
        },
        PaginationProtocol::Numbered => {
            let index = match token {
                PageToken::Index(index) => *index,
                PageToken::Cursor(_) => 1,
            };
            let page_count = object.get("pageCount").and_then(Value::as_u64).unwrap_or(0);
            if page_count > u64::from(index) {
                Continuation::NextIndex(index + 1)
            } else {
                Continuation::None
            }
        }
    };

    Ok(Page {
        items,
        continuation,
    })
}
