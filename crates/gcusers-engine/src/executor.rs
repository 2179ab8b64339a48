//! Retrying request executor.
//!
//! Every remote call goes through [`RequestExecutor::execute`]: a pacing
//! delay before the first attempt, then only server-directed retries on 429.
//! A 429 without `Retry-After`, or any other error status, is fatal.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::transport::{ApiRequest, ApiResponse, Clock, TokioClock, Transport};
use crate::{EngineConfig, EngineError, EngineResult, Verbosity};

/// Error body returned by the platform API.
#[derive(Debug, serde::Deserialize)]
struct PlatformError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Parses the `Retry-After` header value (seconds only).
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    header_value.trim().parse::<u64>().ok()
}

/// Retry bookkeeping for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Attempts already made.
    pub attempt: u32,
    /// Delay before the next attempt.
    pub next_delay: Duration,
    pub aborted: bool,
}

impl RetryState {
    /// State before the first attempt: only the pacing delay is pending.
    #[must_use]
    pub fn first(pacing_delay: Duration) -> Self {
        Self {
            attempt: 0,
            next_delay: pacing_delay,
            aborted: false,
        }
    }

    /// Records that an attempt is being made.
    #[must_use]
    pub fn attempted(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }

    /// Next state after a failed response.
    ///
    /// Retries only a 429 with a usable hint while attempts remain; the wait is
    /// the hinted seconds plus one, since the header is rounded down.
    #[must_use]
    pub fn after_failure(self, response: &ApiResponse, max_attempts: u32) -> Self {
        let hint = if response.is_rate_limited() {
            response.retry_after.as_deref().and_then(parse_retry_after)
        } else {
            None
        };

        match hint {
            Some(secs) if self.attempt < max_attempts => Self {
                next_delay: Duration::from_millis((secs + 1) * 1000),
                ..self
            },
            _ => Self {
                aborted: true,
                ..self
            },
        }
    }
}

/// Builds the fatal error for an aborted call.
fn fatal_error(response: &ApiResponse, state: &RetryState) -> EngineError {
    if response.is_rate_limited() {
        let hinted = response
            .retry_after
            .as_deref()
            .and_then(parse_retry_after)
            .is_some();
        if hinted {
            return EngineError::RetriesExhausted {
                attempts: state.attempt,
            };
        }
        return EngineError::RateLimitedWithoutHint;
    }

    let parsed = serde_json::from_value::<PlatformError>(response.body.clone()).ok();
    let (code, message) = match parsed {
        Some(PlatformError { code, message }) => (
            code.unwrap_or_else(|| response.status.to_string()),
            message.unwrap_or_default(),
        ),
        None => (
            response.status.to_string(),
            response.body.as_str().unwrap_or_default().to_string(),
        ),
    };

    EngineError::Api {
        status: response.status,
        code,
        message,
    }
}

/// Executes remote calls with pacing and server-directed retries.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    pacing_delay: Duration,
    max_attempts: u32,
    verbosity: Verbosity,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("pacing_delay", &self.pacing_delay)
            .field("max_attempts", &self.max_attempts)
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    /// Creates an executor using the tokio clock.
    pub fn new(transport: Arc<dyn Transport>, config: &EngineConfig) -> Self {
        Self::with_clock(transport, Arc::new(TokioClock), config)
    }

    /// Creates an executor with an injected clock.
    pub fn with_clock(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            transport,
            clock,
            pacing_delay: config.pacing_delay(),
            max_attempts: config.max_attempts,
            verbosity: config.verbosity,
        }
    }

    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Executes one logical call and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns a fatal error on transport failure, on any non-429 error
    /// status, on a 429 without hint, or when attempts are exhausted.
    #[instrument(skip(self, request), fields(call = %request))]
    pub async fn execute(&self, request: &ApiRequest) -> EngineResult<Value> {
        let mut state = RetryState::first(self.pacing_delay);

        loop {
            if !state.next_delay.is_zero() {
                self.clock.sleep(state.next_delay).await;
            }
            state = state.attempted();

            if self.verbosity.log_values() {
                debug!(
                    attempt = state.attempt,
                    at = %Utc::now().format("%H:%M:%S%.3f"),
                    "Request attempt"
                );
            }

            let response = self.transport.send(request).await?;
            if response.is_success() {
                return Ok(response.body);
            }

            state = state.after_failure(&response, self.max_attempts);
            if state.aborted {
                let error = fatal_error(&response, &state);
                warn!(status = response.status, attempt = state.attempt, "Aborting call: {error}");
                return Err(error);
            }

            warn!(
                attempt = state.attempt,
                wait_ms = state.next_delay.as_millis() as u64,
                "Rate limited, resuming after server-directed delay"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransport, RecordingClock};
    use serde_json::json;

    fn executor(transport: Arc<FakeTransport>, clock: Arc<RecordingClock>) -> RequestExecutor {
        RequestExecutor::with_clock(transport, clock, &EngineConfig::default())
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(3));
        assert_eq!(parse_retry_after(" 120 "), Some(120));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_retry_state_after_hinted_429() {
        let state = RetryState::first(Duration::from_millis(100)).attempted();
        let next = state.after_failure(&ApiResponse::rate_limited(Some("3")), 2);

        assert!(!next.aborted);
        assert_eq!(next.attempt, 1);
        assert_eq!(next.next_delay, Duration::from_millis(4000));
    }

    #[test]
    fn test_retry_state_aborts_at_ceiling() {
        let state = RetryState::first(Duration::ZERO).attempted().attempted();
        let next = state.after_failure(&ApiResponse::rate_limited(Some("1")), 2);
        assert!(next.aborted);
    }

    #[test]
    fn test_retry_state_aborts_without_hint() {
        let state = RetryState::first(Duration::ZERO).attempted();
        assert!(state.after_failure(&ApiResponse::rate_limited(None), 2).aborted);
        assert!(state
            .after_failure(&ApiResponse::rate_limited(Some("soon")), 2)
            .aborted);
    }

    #[test]
    fn test_retry_state_aborts_on_server_error() {
        let state = RetryState::first(Duration::ZERO).attempted();
        assert!(state
            .after_failure(&ApiResponse::new(500, Value::Null), 2)
            .aborted);
    }

    #[tokio::test]
    async fn test_pacing_delay_before_first_attempt() {
        let transport = Arc::new(FakeTransport::scripted(vec![ApiResponse::ok(json!({"ok": true}))]));
        let clock = Arc::new(RecordingClock::default());

        let body = executor(transport.clone(), clock.clone())
            .execute(&ApiRequest::get("/api/v2/users/u1/adjacents"))
            .await
            .unwrap();

        assert_eq!(body, json!({"ok": true}));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(100)]);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_single_retry_after_server_delay() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            ApiResponse::rate_limited(Some("3")),
            ApiResponse::ok(json!({"entities": []})),
        ]));
        let clock = Arc::new(RecordingClock::default());

        executor(transport.clone(), clock.clone())
            .execute(&ApiRequest::get("/api/v2/routing/skills"))
            .await
            .unwrap();

        assert_eq!(transport.requests().len(), 2);
        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), 2);
        assert!(sleeps[1] >= Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_abandoned_at_attempt_ceiling() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            ApiResponse::rate_limited(Some("3")),
            ApiResponse::rate_limited(Some("3")),
            ApiResponse::ok(json!({})),
        ]));
        let clock = Arc::new(RecordingClock::default());

        let result = executor(transport.clone(), clock)
            .execute(&ApiRequest::get("/api/v2/routing/skills"))
            .await;

        assert!(matches!(result, Err(EngineError::RetriesExhausted { attempts: 2 })));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_429_without_hint_is_fatal() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            ApiResponse::rate_limited(None),
            ApiResponse::ok(json!({})),
        ]));
        let clock = Arc::new(RecordingClock::default());

        let result = executor(transport.clone(), clock)
            .execute(&ApiRequest::get("/api/v2/routing/skills"))
            .await;

        assert!(matches!(result, Err(EngineError::RateLimitedWithoutHint)));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_not_retried() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            ApiResponse::new(
                500,
                json!({"code": "internal.server.error", "message": "boom"}),
            ),
            ApiResponse::ok(json!({})),
        ]));
        let clock = Arc::new(RecordingClock::default());

        let result = executor(transport.clone(), clock.clone())
            .execute(&ApiRequest::post("/api/v2/users/search"))
            .await;

        match result {
            Err(EngineError::Api { status, code, message }) => {
                assert_eq!(status, 500);
                assert_eq!(code, "internal.server.error");
                assert_eq!(message, "boom");
            }
            other => panic!("expected API error, got {other:?}"),
        }
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_plain_body() {
        let transport = Arc::new(FakeTransport::scripted(vec![ApiResponse::new(
            401,
            Value::String("unauthorized".to_string()),
        )]));
        let clock = Arc::new(RecordingClock::default());

        let result = executor(transport, clock)
            .execute(&ApiRequest::get("/api/v2/authorization/roles"))
            .await;

        match result {
            Err(EngineError::Api { status, code, message }) => {
                assert_eq!(status, 401);
                assert_eq!(code, "401");
                assert_eq!(message, "unauthorized");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }
}
