use crate::config::types::{
    ClassifierConfig, Config, EndpointPolicy, HealthConfig, LinkConfig, OutputConfig,
    PaginationConfig, RetryConfig, SiteConfig,
};
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_retry_config(&config.retry)?;
    validate_health_config(&config.health)?;
    validate_pagination_config(&config.pagination)?;
    validate_classifier_config(&config.classifier)?;
    validate_link_config(&config.links)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates site addressing and politeness settings
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "base-url must use http or https, got '{}'",
            base.scheme()
        )));
    }

    for placeholder in ["{party}", "{page}"] {
        if !config.stable_route.contains(placeholder) {
            return Err(ConfigError::Validation(format!(
                "stable-route must contain the {} placeholder, got '{}'",
                placeholder, config.stable_route
            )));
        }
    }
    let sample = config
        .stable_route
        .replace("{party}", "00000000000000")
        .replace("{page}", "0");
    Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid stable-route: {}", e)))?;

    if config.search_type_field.is_empty() || config.search_value_field.is_empty() {
        return Err(ConfigError::Validation(
            "search form field names cannot be empty".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if !(config.request_timeout_secs > 0.0) {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be > 0, got {}",
            config.request_timeout_secs
        )));
    }

    if config.max_concurrent_jobs < 1 || config.max_concurrent_jobs > 32 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-jobs must be between 1 and 32, got {}",
            config.max_concurrent_jobs
        )));
    }

    Ok(())
}

/// Validates backoff arithmetic and endpoint overrides
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.retryable_status_codes.iter().any(|c| !(100..600).contains(c)) {
        return Err(ConfigError::Validation(format!(
            "retryable-status-codes must be valid HTTP status codes, got {:?}",
            config.retryable_status_codes
        )));
    }

    if !(config.initial_delay_secs >= 0.0) {
        return Err(ConfigError::Validation(format!(
            "initial-delay-secs must be >= 0, got {}",
            config.initial_delay_secs
        )));
    }

    if !(config.backoff_multiplier >= 1.0) {
        return Err(ConfigError::Validation(format!(
            "backoff-multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if !(config.max_delay_secs >= config.initial_delay_secs) {
        return Err(ConfigError::Validation(format!(
            "max-delay-secs ({}) must be >= initial-delay-secs ({})",
            config.max_delay_secs, config.initial_delay_secs
        )));
    }

    if !(config.max_timeout_secs > 0.0) {
        return Err(ConfigError::Validation(format!(
            "max-timeout-secs must be > 0, got {}",
            config.max_timeout_secs
        )));
    }

    let endpoints = &config.endpoints;
    for (name, policy) in [
        ("form", endpoints.form),
        ("detail", endpoints.detail),
        ("list", endpoints.list),
        ("stable-route", endpoints.stable_route),
    ] {
        if let Some(policy) = policy {
            validate_endpoint_policy(name, &policy)?;
        }
    }

    Ok(())
}

fn validate_endpoint_policy(name: &str, policy: &EndpointPolicy) -> Result<(), ConfigError> {
    if !(policy.delay_multiplier > 0.0) || !(policy.timeout_multiplier > 0.0) {
        return Err(ConfigError::Validation(format!(
            "retry.endpoints.{} multipliers must be > 0, got delay {} / timeout {}",
            name, policy.delay_multiplier, policy.timeout_multiplier
        )));
    }
    Ok(())
}

/// Validates the health window
fn validate_health_config(config: &HealthConfig) -> Result<(), ConfigError> {
    if config.window_size == 0 || config.recent_window == 0 {
        return Err(ConfigError::Validation(
            "window-size and recent-window must be >= 1".to_string(),
        ));
    }

    if config.window_size < config.min_samples {
        return Err(ConfigError::Validation(format!(
            "window-size ({}) must be >= min-samples ({})",
            config.window_size, config.min_samples
        )));
    }

    if !(config.failure_rate_threshold > 0.0 && config.failure_rate_threshold <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "failure-rate-threshold must be in (0, 1], got {}",
            config.failure_rate_threshold
        )));
    }

    Ok(())
}

fn validate_pagination_config(config: &PaginationConfig) -> Result<(), ConfigError> {
    if config.page_size == 0 {
        return Err(ConfigError::Validation(
            "page-size must be >= 1".to_string(),
        ));
    }

    if config.page_param.is_empty() {
        return Err(ConfigError::Validation(
            "page-param cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Compiles every classifier pattern once to surface typos at startup
fn validate_classifier_config(config: &ClassifierConfig) -> Result<(), ConfigError> {
    let sets = [
        ("process-label", &config.process_label),
        ("rapporteur", &config.rapporteur),
        ("party-roles", &config.party_roles),
        ("timeline", &config.timeline),
        ("judge", &config.judge),
        ("count-phrases", &config.count_phrases),
        ("navigation", &config.navigation),
        ("error-phrases", &config.error_phrases),
    ];

    for (name, patterns) in sets {
        for pattern in patterns.iter() {
            Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidPattern(format!("classifier.{} '{}': {}", name, pattern, e))
            })?;
        }
    }

    Regex::new(&config.case_number).map_err(|e| {
        ConfigError::InvalidPattern(format!("classifier.case-number '{}': {}", config.case_number, e))
    })?;

    Ok(())
}

fn validate_link_config(config: &LinkConfig) -> Result<(), ConfigError> {
    if config.detail_markers.is_empty() {
        return Err(ConfigError::Validation(
            "links.detail-markers cannot be empty".to_string(),
        ));
    }

    if config.selector_strategies.is_empty() {
        return Err(ConfigError::Validation(
            "links.selector-strategies cannot be empty".to_string(),
        ));
    }

    for selector in &config.selector_strategies {
        Selector::parse(selector).map_err(|e| {
            ConfigError::InvalidPattern(format!("links selector '{}': {:?}", selector, e))
        })?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_stable_route_requires_placeholders() {
        let mut config = Config::default();
        config.site.stable_route = "https://www5.trf5.jus.br/cp/processo/{party}".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(msg)) if msg.contains("{page}")
        ));
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = Config::default();
        config.site.base_url = "not a url".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        config.site.base_url = "ftp://www5.trf5.jus.br/cp/".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_timeouts() {
        let mut config = Config::default();
        config.site.request_timeout_secs = 0.0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.retry.max_delay_secs = 0.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_endpoint_multiplier() {
        let mut config = Config::default();
        config.retry.endpoints.list = Some(EndpointPolicy::new(5, 0.0, 1.0));
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(msg)) if msg.contains("list")
        ));
    }

    #[test]
    fn test_health_window_smaller_than_samples() {
        let mut config = Config::default();
        config.health.window_size = 5;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.health.failure_rate_threshold = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_classifier_pattern() {
        let mut config = Config::default();
        config.classifier.error_phrases.push("(unclosed".to_string());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(msg)) if msg.contains("error-phrases")
        ));
    }

    #[test]
    fn test_invalid_selector() {
        let mut config = Config::default();
        config.links.selector_strategies = vec!["a[[".to_string()];
        assert!(matches!(validate(&config), Err(ConfigError::InvalidPattern(_))));
    }

    #[test]
    fn test_empty_database_path() {
        let mut config = Config::default();
        config.output.database_path = String::new();
        assert!(validate(&config).is_err());
    }
}
