//! TRF5 crawler: a resilient case-record collector for the TRF5 public
//! process consultation site.
//!
//! The crate drives the site's search form and stable enumeration routes,
//! classifies every returned page, retries transient failures under an
//! adaptive health-aware backoff policy, and persists both the raw pages and
//! the case records extracted from them.

pub mod classify;
pub mod config;
pub mod crawler;
pub mod normalize;
pub mod output;
pub mod pagination;
pub mod retry;
pub mod robots;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid target: {0}")]
    Validation(#[from] ValidationError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::JobState,
        to: state::JobState,
    },

    #[error("Job task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Rejections of a job's target value, raised before any fetch is issued
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("case number '{value}' has {digits} digits, expected 20")]
    InvalidCaseNumber { value: String, digits: usize },

    #[error("party identifier '{value}' has {digits} digits, expected 14")]
    InvalidPartyId { value: String, digits: usize },

    #[error("target value is empty")]
    EmptyTarget,
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use classify::{Classification, PageClassifier};
pub use config::Config;
pub use crawler::{CrawlOrchestrator, JobParams, JobReport, SearchMode};
pub use retry::{HealthMonitor, RetryPolicy};
pub use state::JobState;
