//! Configuration module for the TRF5 crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use trf5_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("trf5.toml")).unwrap();
//! println!("Retrying at most {} times", config.retry.max_retries);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClassifierConfig, Config, EndpointOverrides, EndpointPolicy, HealthConfig, LimitsConfig,
    LinkConfig, OutputConfig, PaginationConfig, RetryConfig, SiteConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
