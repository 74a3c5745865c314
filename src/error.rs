//! Custom error types for rustscopus.
//!
//! All library functions return `Result<T, HarvestError>`. The variants separate
//! expected absence (`NotFound`) from input that exists but cannot be understood
//! (`MalformedInput`), and carry the `ManualInterventionRequired` signal the
//! crawler turns into a resumable suspension.

use thiserror::Error;

/// Main error type for rustscopus operations.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Page rendered in an unexpected state
    #[error("Browser error: {0}")]
    Browser(String),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Something expected to exist is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input exists but cannot be understood
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A human has to act (log in, refresh the session) before crawling can go on
    #[error("Manual intervention required: {0}")]
    ManualInterventionRequired(String),

    /// Rate limited by the search engine
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Remote site returned an unexpected status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl HarvestError {
    /// True when the crawl must pause for a human instead of skipping ahead.
    pub fn needs_manual_intervention(&self) -> bool {
        matches!(self, HarvestError::ManualInterventionRequired(_))
    }
}

/// Result type alias using `HarvestError`
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| HarvestError::Parse(msg.to_string()))
    }
}
