//! Common test utilities for gcusers-cli integration tests.

#![allow(dead_code)]

use gcusers_cli::cli::Cli;
use gcusers_cli::commands::{self, RunReport};
use gcusers_cli::error::CliResult;
use clap::Parser;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Login and directory API on one mock server.
pub struct TestOrg {
    pub server: MockServer,
    pub dir: TempDir,
}

impl TestOrg {
    /// Starts a server that issues tokens.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "test-token",
                "token_type": "bearer",
                "expires_in": 86400
            })))
            .mount(&server)
            .await;

        Self {
            server,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Settings document pointing at this server, selecting by email.
    pub fn settings(&self, action: &str) -> Value {
        json!({
            "action": action,
            "oauth": {
                "clientID": "client",
                "clientSecret": "secret",
                "orgRegion": "mypurecloud.test",
                "loginUrl": self.server.uri(),
                "apiUrl": self.server.uri()
            },
            "selectUsers": {
                "byType": "email",
                "by": "value",
                "byValue": "user0@example.com,user1@example.com,user2@example.com",
                "useQ64Pagination": false
            },
            "engine": { "pacingDelayMs": 0 }
        })
    }

    pub fn write_settings(&self, settings: &Value) -> PathBuf {
        let file = self.dir.path().join("settings.json");
        std::fs::write(&file, serde_json::to_string_pretty(settings).unwrap()).unwrap();
        file
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Runs the tool with `settings` and extra command-line arguments.
    pub async fn run(&self, settings: &Value, args: &[&str]) -> CliResult<RunReport> {
        let file = self.write_settings(settings);
        let mut argv = vec![
            "gcusers".to_string(),
            "--settings".to_string(),
            file.display().to_string(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        commands::run(Cli::try_parse_from(argv).unwrap()).await
    }

    /// Answers every users search with one page of `users`.
    pub async fn mock_users_search(&self, users: Vec<Value>) {
        Mock::given(method("POST"))
            .and(path("/api/v2/users/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": users.len(),
                "pageCount": 1,
                "results": users
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_listing(&self, request_path: &str, entities: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entities": entities,
                "pageCount": 1
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_write(&self, http_method: &str, request_path: &str) {
        Mock::given(method(http_method))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(204))
            .mount(&self.server)
            .await;
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
}

pub fn create_user(id: &str, email_prefix: &str, auto_answer: bool) -> Value {
    json!({
        "id": id,
        "name": format!("Test User {}", email_prefix),
        "email": format!("{}@example.com", email_prefix),
        "state": "active",
        "department": "Support",
        "division": { "id": "div-home", "name": "Home" },
        "acdAutoAnswer": auto_answer
    })
}
