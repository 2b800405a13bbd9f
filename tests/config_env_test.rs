//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides. Config::from_env() also loads a .env file
//! via dotenvy, which never overrides variables set here.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use compliance_session::config::{Config, LogFormat};
use serial_test::serial;
use std::env;

#[test]
#[serial]
fn test_config_from_env_loads_successfully() {
    let result = Config::from_env();
    assert!(result.is_ok(), "Config::from_env() should succeed with defaults");
}

#[test]
#[serial]
fn test_config_from_env_custom_api() {
    env::set_var("API_URL", "https://contracts.example.com/");
    env::set_var("API_AUTH_TOKEN", "secret-token");

    let config = Config::from_env().unwrap();
    assert_eq!(config.api.base_url, "https://contracts.example.com/");
    assert_eq!(config.api.auth_token.as_deref(), Some("secret-token"));

    env::remove_var("API_URL");
    env::remove_var("API_AUTH_TOKEN");
}

#[test]
#[serial]
fn test_config_blank_token_is_ignored() {
    env::set_var("API_AUTH_TOKEN", "   ");

    let config = Config::from_env().unwrap();
    assert!(config.api.auth_token.is_none());

    env::remove_var("API_AUTH_TOKEN");
}

#[test]
#[serial]
fn test_config_rejects_non_http_url() {
    env::set_var("API_URL", "ftp://contracts.example.com");

    let result = Config::from_env();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("API_URL"));

    env::remove_var("API_URL");
}

#[test]
#[serial]
fn test_config_from_env_custom_database() {
    env::set_var("DATABASE_PATH", "/custom/session.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/session.db");
    assert_eq!(config.database.max_connections, 10);

    env::remove_var("DATABASE_PATH");
    env::remove_var("DATABASE_MAX_CONNECTIONS");
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    env::set_var("LOG_FORMAT", "JSON");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::remove_var("LOG_FORMAT");
}

#[test]
#[serial]
fn test_config_from_env_custom_request() {
    env::set_var("REQUEST_TIMEOUT_MS", "60000");
    env::set_var("MAX_RETRIES", "5");
    env::set_var("RETRY_DELAY_MS", "2000");
    env::set_var("SUPPLEMENTARY_TIMEOUT_MS", "1500");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.timeout_ms, 60000);
    assert_eq!(config.request.max_retries, 5);
    assert_eq!(config.request.retry_delay_ms, 2000);
    assert_eq!(config.request.supplementary_timeout_ms, 1500);

    env::remove_var("REQUEST_TIMEOUT_MS");
    env::remove_var("MAX_RETRIES");
    env::remove_var("RETRY_DELAY_MS");
    env::remove_var("SUPPLEMENTARY_TIMEOUT_MS");
}

#[test]
#[serial]
fn test_config_invalid_number_uses_default() {
    env::set_var("DATABASE_MAX_CONNECTIONS", "not-a-number");
    env::set_var("REQUEST_TIMEOUT_MS", "-1");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.request.timeout_ms, 120_000);

    env::remove_var("DATABASE_MAX_CONNECTIONS");
    env::remove_var("REQUEST_TIMEOUT_MS");
}
