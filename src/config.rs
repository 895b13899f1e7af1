use crate::provider::DEFAULT_BASE_URL;
use crate::retry::RetryPolicy;
use crate::utils::cache::DEFAULT_TTL_SECS;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8888;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 30;

// YAML-serializable configuration structure
#[derive(Serialize, Deserialize, Debug)]
pub struct ConfigYaml {
    pub environment: String,
    pub port: u16,
    pub provider_base_url: Option<String>,
    pub cache_ttl_secs: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub provider_rate_limit_per_minute: Option<u32>,
}

// Holds application-wide settings
#[derive(Clone)]
pub struct AppConfig {
    pub environment: String,
    pub port: u16,
    pub provider_base_url: String,
    pub cache_ttl: Duration,
    pub retry: RetryPolicy,
    pub provider_rate_limit_per_minute: u32,
}

impl AppConfig {
    // Load configuration from YAML file or environment variables
    pub fn load() -> Self {
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            Self::from_yaml(&config_file)
        } else {
            Self::from_env()
        }
    }

    pub fn from_yaml(file_path: &str) -> Self {
        let yaml_content = fs::read_to_string(file_path)
            .unwrap_or_else(|e| panic!("Failed to read config file {}: {}", file_path, e));

        let yaml_config: ConfigYaml = serde_yaml::from_str(&yaml_content)
            .unwrap_or_else(|e| panic!("Failed to parse YAML config: {}", e));

        Self {
            environment: yaml_config.environment,
            port: yaml_config.port,
            provider_base_url: yaml_config
                .provider_base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            cache_ttl: Duration::from_secs(yaml_config.cache_ttl_secs.unwrap_or(DEFAULT_TTL_SECS)),
            retry: RetryPolicy::new(
                yaml_config.retry_max_attempts.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS),
                Duration::from_secs(yaml_config.retry_delay_secs.unwrap_or(DEFAULT_RETRY_DELAY_SECS)),
            ),
            provider_rate_limit_per_minute: yaml_config
                .provider_rate_limit_per_minute
                .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE),
        }
    }

    // Load all configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if present

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let provider_base_url =
            env::var("PROVIDER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let cache_ttl_secs = env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TTL_SECS);

        let retry_max_attempts = env::var("RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS);

        let retry_delay_secs = env::var("RETRY_DELAY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETRY_DELAY_SECS);

        let provider_rate_limit_per_minute = env::var("PROVIDER_RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE);

        Self {
            environment,
            port,
            provider_base_url,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            retry: RetryPolicy::new(retry_max_attempts, Duration::from_secs(retry_delay_secs)),
            provider_rate_limit_per_minute,
        }
    }
}
