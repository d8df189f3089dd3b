//! Configuration module
//!
//! This module provides the configuration of the ingestion service: server
//! settings, blob store connection, cache TTL, key derivation and the hard
//! limits applied by the multipart parser.

use std::env;
use std::time::Duration;

use crate::storage_types::{BlobBackend, BlobEncoding, IdentityMode};

// Common constants
const SERVER_PORT: u16 = 4000;
const BLOB_TTL_SECONDS: u64 = 60 * 60;
const REDIS_URL: &str = "redis://127.0.0.1:6379";
const REDIS_POOL_SIZE: usize = 10;
const REDIS_CONNECTION_TIMEOUT_SECS: u64 = 5;
const MAX_FILE_SIZE_MB: u64 = 10;
const MAX_BODY_SIZE_MB: u64 = 50;
const FETCH_TIMEOUT_SECS: u64 = 30;

/// Hard caps enforced while tokenizing a multipart body.
///
/// These are distinct from the policy file-count limits: crossing one of
/// them ends ingestion with a resource-limit error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParserLimits {
    pub max_file_size_bytes: u64,
    pub max_body_size_bytes: u64,
    pub max_parts: Option<usize>,
    pub max_files: Option<usize>,
    pub max_fields: Option<usize>,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_file_size_bytes: MAX_FILE_SIZE_MB * 1024 * 1024,
            max_body_size_bytes: MAX_BODY_SIZE_MB * 1024 * 1024,
            max_parts: None,
            max_files: None,
            max_fields: None,
        }
    }
}

/// Base configuration shared by every entry point
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub environment: String,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub blob_backend: BlobBackend,
    pub redis_url: String,
    pub redis_pool_size: usize,
    pub redis_connection_timeout: Duration,
    pub redis_key_prefix: Option<String>,
    pub blob_ttl: Duration,
    pub identity_mode: IdentityMode,
    pub blob_encoding: BlobEncoding,
    pub streaming_append: bool,
    pub parser_limits: ParserLimits,
    pub fetch_timeout: Duration,
    pub upload_policy_path: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base: BaseConfig {
                server_port: SERVER_PORT,
                environment: "development".to_string(),
            },
            blob_backend: BlobBackend::Redis,
            redis_url: REDIS_URL.to_string(),
            redis_pool_size: REDIS_POOL_SIZE,
            redis_connection_timeout: Duration::from_secs(REDIS_CONNECTION_TIMEOUT_SECS),
            redis_key_prefix: None,
            blob_ttl: Duration::from_secs(BLOB_TTL_SECONDS),
            identity_mode: IdentityMode::Hash,
            blob_encoding: BlobEncoding::Base64,
            streaming_append: false,
            parser_limits: ParserLimits::default(),
            fetch_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            upload_policy_path: None,
            cors_origins: vec!["*".to_string()],
        }
    }
}

fn optional_count(name: &str) -> Option<usize> {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
        };

        let blob_backend = env::var("BLOB_BACKEND")
            .unwrap_or_else(|_| "redis".to_string())
            .parse::<BlobBackend>()?;

        let identity_mode = env::var("IDENTITY_MODE")
            .unwrap_or_else(|_| "hash".to_string())
            .parse::<IdentityMode>()?;

        let blob_encoding = env::var("BLOB_ENCODING")
            .unwrap_or_else(|_| "base64".to_string())
            .parse::<BlobEncoding>()?;

        let max_file_size_mb = env::var("MAX_FILE_SIZE_MB")
            .unwrap_or_else(|_| MAX_FILE_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(MAX_FILE_SIZE_MB);

        let max_body_size_mb = env::var("MAX_BODY_SIZE_MB")
            .unwrap_or_else(|_| MAX_BODY_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(MAX_BODY_SIZE_MB);

        let config = Config {
            base,
            blob_backend,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| REDIS_URL.to_string()),
            redis_pool_size: env::var("REDIS_POOL_SIZE")
                .unwrap_or_else(|_| REDIS_POOL_SIZE.to_string())
                .parse()
                .unwrap_or(REDIS_POOL_SIZE),
            redis_connection_timeout: Duration::from_secs(
                env::var("REDIS_CONNECTION_TIMEOUT_SECS")
                    .unwrap_or_else(|_| REDIS_CONNECTION_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(REDIS_CONNECTION_TIMEOUT_SECS),
            ),
            redis_key_prefix: env::var("REDIS_KEY_PREFIX")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            blob_ttl: Duration::from_secs(
                env::var("BLOB_TTL_SECONDS")
                    .unwrap_or_else(|_| BLOB_TTL_SECONDS.to_string())
                    .parse()
                    .unwrap_or(BLOB_TTL_SECONDS),
            ),
            identity_mode,
            blob_encoding,
            streaming_append: env::var("STREAMING_APPEND")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(false),
            parser_limits: ParserLimits {
                max_file_size_bytes: max_file_size_mb * 1024 * 1024,
                max_body_size_bytes: max_body_size_mb * 1024 * 1024,
                max_parts: optional_count("MAX_PARTS"),
                max_files: optional_count("MAX_FILES"),
                max_fields: optional_count("MAX_FIELDS"),
            },
            fetch_timeout: Duration::from_secs(
                env::var("FETCH_TIMEOUT_SECS")
                    .unwrap_or_else(|_| FETCH_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(FETCH_TIMEOUT_SECS),
            ),
            upload_policy_path: env::var("UPLOAD_POLICY_PATH")
                .ok()
                .filter(|s| !s.is_empty()),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.blob_ttl.is_zero() {
            return Err(anyhow::anyhow!("BLOB_TTL_SECONDS must be greater than zero"));
        }

        if self.streaming_append && self.identity_mode == IdentityMode::Hash {
            return Err(anyhow::anyhow!(
                "STREAMING_APPEND=true requires IDENTITY_MODE=token: content hashes are only known after the last chunk"
            ));
        }

        if self.parser_limits.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than zero"));
        }

        if self.parser_limits.max_body_size_bytes < self.parser_limits.max_file_size_bytes {
            return Err(anyhow::anyhow!(
                "MAX_BODY_SIZE_MB must be at least MAX_FILE_SIZE_MB"
            ));
        }

        if self.blob_backend == BlobBackend::Redis {
            if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
                return Err(anyhow::anyhow!(
                    "REDIS_URL must be a valid redis:// or rediss:// connection string"
                ));
            }
            if self.redis_pool_size == 0 {
                return Err(anyhow::anyhow!("REDIS_POOL_SIZE must be greater than zero"));
            }
        }

        Ok(())
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.base.server_port
    }

    pub fn blob_ttl(&self) -> Duration {
        self.blob_ttl
    }

    pub fn parser_limits(&self) -> &ParserLimits {
        &self.parser_limits
    }

    pub fn upload_policy_path(&self) -> Option<&str> {
        self.upload_policy_path.as_deref()
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.cors_origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.blob_ttl(), Duration::from_secs(3600));
        assert!(!config.is_production());
        assert_eq!(config.blob_backend, BlobBackend::Redis);
    }

    #[test]
    fn test_streaming_append_requires_token_identity() {
        let config = Config {
            streaming_append: true,
            identity_mode: IdentityMode::Hash,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            streaming_append: true,
            identity_mode: IdentityMode::Token,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_url_is_checked_for_redis_backend() {
        let config = Config {
            blob_backend: BlobBackend::Redis,
            redis_url: "http://localhost:6379".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_body_limit_must_cover_file_limit() {
        let config = Config {
            parser_limits: ParserLimits {
                max_file_size_bytes: 10,
                max_body_size_bytes: 5,
                ..ParserLimits::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
