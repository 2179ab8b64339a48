//! Engine configuration: pacing, retry ceiling, page and bulk sizes,
//! dedup policy, input verification and log verbosity.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Diagnostic verbosity threaded into every engine component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Warnings and errors only.
    Quiet,
    /// Progress and summary lines (default).
    #[default]
    Normal,
    /// Per-stage details and unknown verification values.
    Verbose,
    /// Attempt timestamps and full value dumps.
    Debug,
}

impl Verbosity {
    /// Maps the numeric debug level used in settings files (0, 1, 2).
    #[must_use]
    pub fn from_debug_level(level: u8) -> Self {
        match level {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if per-stage details should be logged.
    #[must_use]
    pub fn log_details(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::Debug)
    }

    /// Check if attempt timestamps and value dumps should be logged.
    #[must_use]
    pub fn log_values(&self) -> bool {
        matches!(self, Verbosity::Debug)
    }

    /// Check if progress logging should occur.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Default `tracing` filter directive for this level.
    #[must_use]
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::Debug => "trace",
        }
    }
}

/// How duplicates are handled across criteria windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DedupPolicy {
    /// Keep every record as received.
    Disabled,
    /// Dedup from the second window onward.
    #[default]
    SkipFirstWindow,
    /// Dedup every window and log each discarded id.
    Always,
}

/// Post-aggregation input verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerifyInput {
    #[default]
    Off,
    /// Log unmatched values and continue.
    Warn,
    /// Abort the run on any unmatched value.
    Strict,
}

impl VerifyInput {
    /// Maps the numeric verification level used in settings files (0, 1, 2).
    #[must_use]
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Off,
            1 => Self::Warn,
            _ => Self::Strict,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, VerifyInput::Off)
    }
}

/// Configuration shared by the executor, aggregator, batcher and resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Delay before the first attempt of every call in milliseconds (default: 100).
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,

    /// Total attempts for a rate-limited call, first one included (default: 2).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Items requested per search page (default: 50).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Items requested per user queue page (default: 25).
    #[serde(default = "default_queue_page_size")]
    pub queue_page_size: u32,

    /// Maximum ids per bulk write call (default: 90).
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,

    #[serde(default)]
    pub dedup: DedupPolicy,

    #[serde(default)]
    pub verify: VerifyInput,

    #[serde(default)]
    pub verbosity: Verbosity,
}

fn default_pacing_delay_ms() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    2
}

fn default_page_size() -> u32 {
    50
}

fn default_queue_page_size() -> u32 {
    25
}

fn default_bulk_size() -> usize {
    90
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pacing_delay_ms: default_pacing_delay_ms(),
            max_attempts: default_max_attempts(),
            page_size: default_page_size(),
            queue_page_size: default_queue_page_size(),
            bulk_size: default_bulk_size(),
            dedup: DedupPolicy::default(),
            verify: VerifyInput::default(),
            verbosity: Verbosity::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for tests: no pacing, small pages.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            pacing_delay_ms: 0,
            page_size: 2,
            queue_page_size: 2,
            bulk_size: 2,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dedup(mut self, dedup: DedupPolicy) -> Self {
        self.dedup = dedup;
        self
    }

    #[must_use]
    pub fn with_verify(mut self, verify: VerifyInput) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_bulk_size(mut self, bulk_size: usize) -> Self {
        self.bulk_size = bulk_size;
        self
    }

    /// Pacing delay applied before every first attempt.
    #[must_use]
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        if self.page_size == 0 || self.page_size > 500 {
            return Err("page_size must be in range [1, 500]".to_string());
        }
        if self.queue_page_size == 0 {
            return Err("queue_page_size must be > 0".to_string());
        }
        if self.bulk_size == 0 {
            return Err("bulk_size must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.pacing_delay_ms, 100);
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.queue_page_size, 25);
        assert_eq!(config.bulk_size, 90);
        assert_eq!(config.dedup, DedupPolicy::SkipFirstWindow);
        assert_eq!(config.verify, VerifyInput::Off);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_bulk_size() {
        let config = EngineConfig::default().with_bulk_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"dedup":"always","verify":"strict"}"#).unwrap();
        assert_eq!(config.dedup, DedupPolicy::Always);
        assert_eq!(config.verify, VerifyInput::Strict);
        assert_eq!(config.bulk_size, 90);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(Verbosity::from_debug_level(0), Verbosity::Normal);
        assert_eq!(Verbosity::from_debug_level(1), Verbosity::Verbose);
        assert_eq!(Verbosity::from_debug_level(7), Verbosity::Debug);
        assert!(Verbosity::Debug.log_values());
        assert!(!Verbosity::Verbose.log_values());
        assert!(Verbosity::Verbose.log_details());
        assert!(!Verbosity::Quiet.is_enabled());
    }

    #[test]
    fn test_verify_levels() {
        assert_eq!(VerifyInput::from_level(0), VerifyInput::Off);
        assert_eq!(VerifyInput::from_level(1), VerifyInput::Warn);
        assert_eq!(VerifyInput::from_level(2), VerifyInput::Strict);
        assert!(!VerifyInput::Off.is_enabled());
    }
}
