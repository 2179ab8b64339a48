//! CLI error types and exit codes

use gcusers_engine::EngineError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General or configuration error
/// - 2: Authentication failed
/// - 3: Network error
/// - 4: Validation or verification error
/// - 5: Server error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("CSV error: {0}")]
    Csv(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(engine) => engine_exit_code(engine),
            CliError::Validation(_) => 4,
            CliError::Config(_) | CliError::Io(_) | CliError::Csv(_) => 1,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    /// Get a suggested action for this error
    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Engine(EngineError::Auth(_)) => {
                Some("Check the OAuth client id, client secret and org region.")
            }
            CliError::Engine(EngineError::RetriesExhausted { .. })
            | CliError::Engine(EngineError::RateLimitedWithoutHint) => {
                Some("The organization is rate limited. Try again in a few moments.")
            }
            CliError::Engine(EngineError::VerificationMismatch { .. }) => {
                Some("Fix the unknown input values or lower verifyInput to 1 to continue with a warning.")
            }
            CliError::Engine(EngineError::SearchListTooLarge { .. }) => {
                Some("Split the input into several runs.")
            }
            _ => None,
        }
    }
}

fn engine_exit_code(error: &EngineError) -> i32 {
    match error {
        EngineError::Auth(_) => 2,
        EngineError::Http(_) => 3,
        EngineError::VerificationMismatch { .. }
        | EngineError::SearchListTooLarge { .. }
        | EngineError::EmptySelection(_) => 4,
        EngineError::Api { status, .. } => {
            if *status >= 500 {
                5
            } else if *status == 401 || *status == 403 {
                2
            } else {
                4
            }
        }
        EngineError::RateLimitedWithoutHint | EngineError::RetriesExhausted { .. } => 5,
        EngineError::Config(_)
        | EngineError::Json(_)
        | EngineError::Url(_)
        | EngineError::UnexpectedResponse { .. } => 1,
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Config(format!("JSON error: {}", e))
    }
}

impl From<csv::Error> for CliError {
    fn from(e: csv::Error) -> Self {
        CliError::Csv(e.to_string())
    }
}
