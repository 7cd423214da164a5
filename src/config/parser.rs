use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use trf5_crawler::config::load_config;
///
/// let config = load_config(Path::new("trf5.toml")).unwrap();
/// println!("Searching {}", config.site.base_url);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Each crawl run stores this hash so runs made under different settings
/// can be told apart.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[site]
base-url = "https://www5.trf5.jus.br/cp/"
download-delay-ms = 1000
preload-form = false

[retry]
max-retries = 7
jitter = false

[retry.endpoints.detail]
max-retries = 2

[health]
window-size = 50

[limits]
max-pages = 3

[pagination]
sequential-bound = 8

[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.site.download_delay_ms, 1000);
        assert!(!config.site.preload_form);
        assert_eq!(config.retry.max_retries, 7);
        assert!(!config.retry.jitter);
        let detail = config.retry.endpoints.detail.unwrap();
        assert_eq!(detail.max_retries, 2);
        assert_eq!(detail.delay_multiplier, 1.0);
        assert_eq!(config.health.window_size, 50);
        assert_eq!(config.health.min_samples, 10);
        assert_eq!(config.limits.max_pages, Some(3));
        assert_eq!(config.limits.max_details_per_page, None);
        assert_eq!(config.pagination.sequential_bound, 8);
        assert_eq!(config.output.database_path, "./test.db");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.site.base_url, "https://www5.trf5.jus.br/cp/");
        assert_eq!(config.retry.retryable_status_codes, vec![500, 502, 503, 504, 408, 429]);
        assert_eq!(config.retry.endpoints.form.unwrap().max_retries, 3);
        assert_eq!(config.retry.endpoints.stable_route.unwrap().max_retries, 6);
        assert_eq!(config.pagination.page_size, 10);
        assert!(config.classifier.strict_error_fallback);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/trf5.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config(
            r#"
[retry]
backoff-multiplier = 0.5
"#,
        );
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
