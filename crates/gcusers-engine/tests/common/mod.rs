//! Common test utilities for gcusers-engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use gcusers_engine::{
    Aggregator, BulkBatcher, Clock, EngineConfig, HttpTransport, PageFetcher, RequestExecutor,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_TOKEN: &str = "test-token";

/// Clock that records requested sleeps instead of waiting.
#[derive(Debug, Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Test data factory for users.
pub fn create_test_user(id: &str, email_prefix: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Test User {}", email_prefix),
        "email": format!("{}@example.com", email_prefix),
        "state": "active",
        "title": "Agent",
        "department": "Support",
        "division": { "id": "div-home", "name": "Home" },
        "acdAutoAnswer": false
    })
}

/// Test data factory for users holding the given roles.
pub fn create_user_with_roles(id: &str, email_prefix: &str, roles: &[&str]) -> Value {
    let mut user = create_test_user(id, email_prefix);
    user["authorization"] = json!({
        "roles": roles.iter().map(|name| json!({ "name": name })).collect::<Vec<_>>()
    });
    user
}

pub fn create_role(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name })
}

pub fn create_division(id: &str, name: &str, home: bool) -> Value {
    json!({ "id": id, "name": name, "homeDivision": home })
}

pub fn create_group(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "type": "official",
        "visibility": "public",
        "memberCount": 3
    })
}

/// Search response with `results`.
pub fn create_search_page(results: Vec<Value>, page_count: u32) -> Value {
    json!({
        "total": results.len(),
        "pageCount": page_count,
        "results": results
    })
}

/// Search response continued by a `q64` cursor.
pub fn create_cursor_page(results: Vec<Value>, cursor: Option<&str>) -> Value {
    let mut page = json!({ "results": results });
    if let Some(cursor) = cursor {
        page["nextPage"] = json!(format!("/api/v2/users/search?q64={cursor}&expand=groups"));
    }
    page
}

/// Listing response with `entities`.
pub fn create_listing_page(entities: Vec<Value>, page_count: u32) -> Value {
    json!({
        "entities": entities,
        "pageCount": page_count
    })
}

pub fn create_platform_error(status: u16, code: &str, message: &str) -> Value {
    json!({ "status": status, "code": code, "message": message })
}

/// Mock directory API server.
pub struct MockApiServer {
    pub server: MockServer,
    pub clock: Arc<RecordingClock>,
}

impl MockApiServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            clock: Arc::new(RecordingClock::default()),
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Executor talking to this server over HTTP with a recording clock.
    pub fn executor(&self, config: &EngineConfig) -> RequestExecutor {
        let base_url = Url::parse(&self.server.uri()).unwrap();
        let transport =
            HttpTransport::with_base_url(base_url, SecretString::new(TEST_TOKEN.to_string()))
                .unwrap();
        RequestExecutor::with_clock(Arc::new(transport), self.clock.clone(), config)
    }

    pub fn aggregator(&self, config: &EngineConfig) -> Aggregator {
        Aggregator::new(
            PageFetcher::new(self.executor(config), config.page_size),
            config,
        )
    }

    pub fn batcher(&self, config: &EngineConfig) -> BulkBatcher {
        BulkBatcher::new(self.executor(config), config)
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server.received_requests().await.unwrap_or_default().len()
    }

    /// JSON bodies of received requests to `request_path`, in order.
    pub async fn bodies_to(&self, request_path: &str) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .map(|r| serde_json::from_slice(&r.body).unwrap_or(Value::Null))
            .collect()
    }

    /// Sets up one numbered page of the users search.
    pub async fn mock_users_search_page(&self, page_number: u32, page: Value) {
        Mock::given(method("POST"))
            .and(path("/api/v2/users/search"))
            .and(body_partial_json(json!({ "pageNumber": page_number })))
            .respond_with(ResponseTemplate::new(200).set_body_json(page))
            .mount(&self.server)
            .await;
    }

    /// Sets up the users search continued by `cursor`.
    pub async fn mock_users_cursor_page(&self, cursor: &str, page: Value) {
        Mock::given(method("GET"))
            .and(path("/api/v2/users/search"))
            .and(query_param("q64", cursor))
            .respond_with(ResponseTemplate::new(200).set_body_json(page))
            .mount(&self.server)
            .await;
    }

    /// Sets up the roles listing filtered by name.
    pub async fn mock_roles_endpoint(&self, roles: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/api/v2/authorization/roles"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_listing_page(roles, 1)),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_divisions_endpoint(&self, divisions: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/api/v2/authorization/divisions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_listing_page(divisions, 1)),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_role_members_endpoint(&self, role_id: &str, members: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v2/authorization/roles/{role_id}/users")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_listing_page(members, 1)),
            )
            .mount(&self.server)
            .await;
    }

    /// Accepts any write with an empty 204.
    pub async fn mock_write(&self, http_method: &str, request_path: &str) {
        Mock::given(method(http_method))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(204))
            .mount(&self.server)
            .await;
    }
}

/// Generate a sequence of test users.
pub fn generate_test_users(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| create_test_user(&format!("user-{}", i), &format!("user{}", i)))
        .collect()
}
