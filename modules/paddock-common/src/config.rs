use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::ConfigError;

/// Which store backs the entity cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    DynamoDb,
    Memory,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Fetching
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub request_delay: Duration,
    pub race_base_url: String,
    pub db_base_url: String,

    // Cache
    pub cache_backend: CacheBackendKind,
    pub cache_ttl_secs: i64,
    pub dynamodb_table: String,
    pub aws_region: String,
    pub dynamodb_endpoint: Option<String>,

    // Assembly
    pub max_concurrent_entrants: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            request_delay: Duration::from_secs(1),
            race_base_url: "https://race.netkeiba.com".to_string(),
            db_base_url: "https://db.netkeiba.com".to_string(),
            cache_backend: CacheBackendKind::DynamoDb,
            cache_ttl_secs: 7 * 24 * 60 * 60,
            dynamodb_table: "keiba_cache".to_string(),
            aws_region: "ap-northeast-1".to_string(),
            dynamodb_endpoint: None,
            max_concurrent_entrants: 4,
        }
    }
}

impl Config {
    /// Load configuration from environment variables. Every variable is
    /// optional; unset ones keep their default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let request_delay_secs: f64 = parse_env(
            "SCRAPING_DELAY_SECONDS",
            "a non-negative number of seconds",
            defaults.request_delay.as_secs_f64(),
        )?;
        if !request_delay_secs.is_finite() || request_delay_secs < 0.0 {
            return Err(ConfigError::Invalid {
                key: "SCRAPING_DELAY_SECONDS",
                expected: "a non-negative number of seconds",
                value: request_delay_secs.to_string(),
            });
        }

        let cache_ttl_secs: i64 = parse_env(
            "CACHE_TTL_SECONDS",
            "a positive whole number of seconds",
            defaults.cache_ttl_secs,
        )?;
        if cache_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                key: "CACHE_TTL_SECONDS",
                expected: "a positive whole number of seconds",
                value: cache_ttl_secs.to_string(),
            });
        }

        let cache_backend = match env::var("CACHE_BACKEND") {
            Err(_) => defaults.cache_backend,
            Ok(v) => match v.to_ascii_lowercase().as_str() {
                "dynamodb" => CacheBackendKind::DynamoDb,
                "memory" => CacheBackendKind::Memory,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "CACHE_BACKEND",
                        expected: "`dynamodb` or `memory`",
                        value: v,
                    })
                }
            },
        };

        Ok(Self {
            request_timeout: Duration::from_secs(parse_env(
                "REQUEST_TIMEOUT",
                "a whole number of seconds",
                defaults.request_timeout.as_secs(),
            )?),
            max_retries: parse_env("MAX_RETRIES", "a positive integer", defaults.max_retries)?
                .max(1),
            request_delay: Duration::from_secs_f64(request_delay_secs),
            race_base_url: env::var("RACE_BASE_URL").unwrap_or(defaults.race_base_url),
            db_base_url: env::var("DB_BASE_URL").unwrap_or(defaults.db_base_url),
            cache_backend,
            cache_ttl_secs,
            dynamodb_table: env::var("DYNAMODB_TABLE").unwrap_or(defaults.dynamodb_table),
            aws_region: env::var("AWS_REGION").unwrap_or(defaults.aws_region),
            dynamodb_endpoint: env::var("DYNAMODB_ENDPOINT").ok().filter(|s| !s.is_empty()),
            max_concurrent_entrants: parse_env(
                "MAX_CONCURRENT_ENTRANTS",
                "a positive integer",
                defaults.max_concurrent_entrants,
            )?
            .max(1),
        })
    }

    /// Log the effective settings. Nothing here is secret; credentials come
    /// from the AWS provider chain, not this struct.
    pub fn log_redacted(&self) {
        info!(
            request_timeout_secs = self.request_timeout.as_secs(),
            max_retries = self.max_retries,
            request_delay_ms = self.request_delay.as_millis() as u64,
            race_base_url = %self.race_base_url,
            db_base_url = %self.db_base_url,
            cache_backend = ?self.cache_backend,
            cache_ttl_secs = self.cache_ttl_secs,
            dynamodb_table = %self.dynamodb_table,
            aws_region = %self.aws_region,
            dynamodb_endpoint = self.dynamodb_endpoint.as_deref().unwrap_or("(default)"),
            max_concurrent_entrants = self.max_concurrent_entrants,
            "Loaded config"
        );
    }
}

fn parse_env<T: FromStr>(
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value: raw,
        }),
    }
}
