//! Client configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file is a
//! valid configuration. `SPIFF_BACKEND_BASE_URL` overrides the base URL.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

pub const BACKEND_BASE_URL_ENV: &str = "SPIFF_BACKEND_BASE_URL";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_backend_base_url")]
    pub backend_base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Timing policy of the query cache.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// How long a resolved entry is served without refetching.
    #[serde(rename = "stale_time_ms", deserialize_with = "millis")]
    pub stale_time: Duration,
    /// How long an entry without observers stays in memory.
    #[serde(rename = "gc_time_ms", deserialize_with = "millis")]
    pub gc_time: Duration,
    /// Automatic retries for failed reads.
    pub retry: u32,
    #[serde(rename = "retry_delay_ms", deserialize_with = "millis")]
    pub retry_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            gc_time: Duration::from_secs(300),
            retry: 1,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_base_url: default_backend_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Read `path` if given, apply the environment override, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        if let Ok(base_url) = std::env::var(BACKEND_BASE_URL_ENV) {
            config.backend_base_url = base_url;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.backend_base_url.trim();
        if base.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "backend_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "backend_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.gc_time < self.cache.stale_time {
            return Err(ConfigError::InvalidValue {
                field: "cache.gc_time_ms",
                reason: "must be >= cache.stale_time_ms".to_string(),
            });
        }
        Ok(())
    }
}

fn default_backend_base_url() -> String {
    "http://localhost:7000/v1.0".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config.backend_base_url, "http://localhost:7000/v1.0");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache, CacheConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn cache_table_is_read_in_milliseconds() {
        let config = ClientConfig::from_toml_str(
            r#"
            backend_base_url = "https://engine.example.com/v1.0"

            [cache]
            stale_time_ms = 5000
            gc_time_ms = 60000
            retry = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.stale_time, Duration::from_secs(5));
        assert_eq!(config.cache.gc_time, Duration::from_secs(60));
        assert_eq!(config.cache.retry, 0);
        assert_eq!(config.cache.retry_delay, Duration::from_millis(1000));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = ClientConfig::from_toml_str("base = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn relative_base_url_is_invalid() {
        let config = ClientConfig {
            backend_base_url: "localhost:7000".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "backend_base_url",
                ..
            })
        ));
    }

    #[test]
    fn gc_shorter_than_stale_is_invalid() {
        let config = ClientConfig {
            cache: CacheConfig::new()
                .with_stale_time(Duration::from_secs(60))
                .with_gc_time(Duration::from_secs(10)),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let config = ClientConfig {
            request_timeout_ms: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::from_path(&dir.path().join("client.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    // The only test that touches the environment; keep it that way so tests
    // running in parallel never observe the override.
    #[test]
    fn environment_overrides_file_base_url() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "backend_base_url = \"https://file.example.com/v1.0\"\nrequest_timeout_ms = 5000"
        )
        .unwrap();

        std::env::remove_var(BACKEND_BASE_URL_ENV);
        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.backend_base_url, "https://file.example.com/v1.0");

        std::env::set_var(BACKEND_BASE_URL_ENV, "https://env.example.com/v1.0");
        let overridden = ClientConfig::load(Some(file.path()));
        std::env::set_var(BACKEND_BASE_URL_ENV, "env.example.com/v1.0");
        let relative = ClientConfig::load(Some(file.path()));
        std::env::remove_var(BACKEND_BASE_URL_ENV);

        let config = overridden.unwrap();
        assert_eq!(config.backend_base_url, "https://env.example.com/v1.0");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(matches!(
            relative,
            Err(ConfigError::InvalidValue {
                field: "backend_base_url",
                ..
            })
        ));
    }
}
