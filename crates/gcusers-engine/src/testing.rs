//! In-process fakes for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::transport::{ApiRequest, ApiResponse, Clock, Transport};
use crate::{EngineConfig, EngineResult, RequestExecutor};

type Handler = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

/// Transport answering from a script or a routing closure, recording requests.
pub struct FakeTransport {
    script: Mutex<VecDeque<ApiResponse>>,
    handler: Option<Handler>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    /// Answers requests in order from `responses`.
    pub fn scripted(responses: Vec<ApiResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            handler: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request through `handler`.
    pub fn routed(handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            handler: Some(Box::new(handler)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose path equals `path`.
    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &ApiRequest) -> EngineResult<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(ref handler) = self.handler {
            return Ok(handler(request));
        }
        let next = self.script.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ApiResponse::new(599, Value::String("unscripted".into()))))
    }
}

/// Clock that records requested sleeps and returns immediately.
#[derive(Default)]
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

/// Executor over `transport` with a recording clock and test config.
pub fn executor_for(transport: Arc<FakeTransport>, config: &EngineConfig) -> RequestExecutor {
    RequestExecutor::with_clock(transport, Arc::new(RecordingClock::default()), config)
}
