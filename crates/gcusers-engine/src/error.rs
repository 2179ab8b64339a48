//! Error types for the resolution and bulk mutation engine.

use thiserror::Error;

/// Result type alias using `EngineError`.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while resolving, paginating or mutating entities.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration validation error, raised before any remote call.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Client-credentials authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Remote API returned a non-success status.
    #[error("API error (status {status}): {code} - {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Rate limited without a usable `Retry-After` hint.
    #[error("Rate limited (429) without a Retry-After hint, aborting")]
    RateLimitedWithoutHint,

    /// Rate limited on every attempt.
    #[error("Rate limit still in effect after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The remote response did not have the expected shape.
    #[error("Unexpected response from {resource}: {detail}")]
    UnexpectedResponse { resource: String, detail: String },

    /// A stage received more input values than it accepts.
    #[error("Search list for {resource} contains {count} items, maximum is {max}")]
    SearchListTooLarge {
        resource: String,
        count: usize,
        max: usize,
    },

    /// Strict verification found input values with no match.
    #[error("Verification failed for {resource}: {requested} requested, {resolved} resolved (unknown: {})", unknown.join(", "))]
    VerificationMismatch {
        resource: String,
        requested: usize,
        resolved: usize,
        unknown: Vec<String>,
    },

    /// Selection (or post-selection filter) produced no entities.
    #[error("Selection is empty: {0}")]
    EmptySelection(String),
}

impl EngineError {
    /// Returns the HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimitedWithoutHint | Self::RetriesExhausted { .. } => Some(429),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true for errors detected before any remote call.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::SearchListTooLarge { .. })
    }
}
