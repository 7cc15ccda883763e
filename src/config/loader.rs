//! Configuration loader for YAML files
//!
//! Loads the client configuration from YAML, applies URL overrides from
//! the environment (`TRADING_WS_URL`, `TRADING_HTTP_URL`) and validates.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::AppError;

use super::types::ClientConfig;

/// Env var overriding `ws_url`
const ENV_WS_URL: &str = "TRADING_WS_URL";
/// Env var overriding `http_url`
const ENV_HTTP_URL: &str = "TRADING_HTTP_URL";

/// Load configuration from a YAML file
///
/// # Arguments
/// * `path` - Path to the configuration YAML file
///
/// # Returns
/// * `Ok(ClientConfig)` - Successfully loaded and validated configuration
/// * `Err(AppError)` - File not found, parse error, or validation failure
pub fn load_config(path: &Path) -> Result<ClientConfig, AppError> {
    if !path.exists() {
        return Err(AppError::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut config: ClientConfig = serde_yaml::from_reader(reader)
        .map_err(|e| AppError::Config(format!("YAML parse error in '{}': {}", path.display(), e)))?;

    apply_env_overrides(&mut config);
    config.validate()?;

    Ok(config)
}

/// Load configuration from a YAML string (useful for testing)
pub fn load_config_from_str(yaml_content: &str) -> Result<ClientConfig, AppError> {
    let mut config: ClientConfig = serde_yaml::from_str(yaml_content)
        .map_err(|e| AppError::Config(format!("YAML parse error: {}", e)))?;

    apply_env_overrides(&mut config);
    config.validate()?;

    Ok(config)
}

fn apply_env_overrides(config: &mut ClientConfig) {
    if let Ok(ws_url) = std::env::var(ENV_WS_URL) {
        config.ws_url = ws_url;
    }
    if let Ok(http_url) = std::env::var(ENV_HTTP_URL) {
        config.http_url = http_url;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_CONFIG_YAML: &str = r#"
ws_url: "wss://example.org/trader/"
http_url: "https://example.org/api/"
book:
  depth: 3
  step: 1.0
  adjustment_threshold: 2.0
  default_price: 100.0
reconnect:
  max_attempts: 5
  initial_delay_ms: 3000
  max_delay_ms: 30000
max_markets: 4
"#;

    #[test]
    #[serial]
    fn test_load_valid_yaml_string() {
        let config = load_config_from_str(VALID_CONFIG_YAML).expect("should parse");
        assert_eq!(config.book.depth, 3);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.max_markets, 4);
    }

    #[test]
    #[serial]
    fn test_defaults_fill_missing_sections() {
        let minimal = r#"
ws_url: "wss://example.org/trader/"
http_url: "https://example.org/api/"
"#;
        let config = load_config_from_str(minimal).expect("should parse");
        assert_eq!(config.book.depth, 5);
        assert_eq!(config.max_markets, 4);
        assert_eq!(config.state_dir, ".state");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().expect("tempfile");
        file.write_all(VALID_CONFIG_YAML.as_bytes()).expect("write");
        let config = load_config(file.path()).expect("should load");
        assert_eq!(config.ws_url, "wss://example.org/trader/");
    }

    #[test]
    #[serial]
    fn test_missing_file_errors() {
        let err = load_config(Path::new("does/not/exist.yaml")).unwrap_err();
        assert!(err.to_string().contains("not found"), "Got: {}", err);
    }

    #[test]
    #[serial]
    fn test_invalid_yaml_errors() {
        let err = load_config_from_str("ws_url: [unterminated").unwrap_err();
        assert!(err.to_string().contains("YAML parse error"), "Got: {}", err);
    }

    #[test]
    #[serial]
    fn test_env_override_takes_precedence() {
        std::env::set_var(ENV_WS_URL, "wss://override.example.org/trader/");
        let config = load_config_from_str(VALID_CONFIG_YAML).expect("should parse");
        std::env::remove_var(ENV_WS_URL);
        assert_eq!(config.ws_url, "wss://override.example.org/trader/");
    }
}
