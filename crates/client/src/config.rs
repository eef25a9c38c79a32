//! Backend client configuration loaded from environment variables.

use std::time::Duration;

/// Connection and polling settings for talking to the backends.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the session/job API.
    pub api_url: String,
    /// Base URL of the theme transform service. `None` selects the offline
    /// keyword transform.
    pub transform_url: Option<String>,
    /// Bearer token, if one is configured.
    pub api_token: Option<String>,
    /// Delay between job status polls.
    pub poll_interval: Duration,
    /// Consecutive poll failures tolerated before polling is abandoned.
    pub poll_error_threshold: u32,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api/v1".to_string(),
            transform_url: None,
            api_token: None,
            poll_interval: Duration::from_millis(2_000),
            poll_error_threshold: 3,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment (and `.env`).
    ///
    /// | Env Var                        | Default                        |
    /// |--------------------------------|--------------------------------|
    /// | `ATELIER_API_URL`              | `http://localhost:3000/api/v1` |
    /// | `ATELIER_TRANSFORM_URL`        | unset (offline transform)      |
    /// | `ATELIER_API_TOKEN`            | unset                          |
    /// | `ATELIER_POLL_INTERVAL_MS`     | `2000`                         |
    /// | `ATELIER_POLL_ERROR_THRESHOLD` | `3`                            |
    /// | `ATELIER_REQUEST_TIMEOUT_SECS` | `30`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = non_empty("ATELIER_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);
        let transform_url =
            non_empty("ATELIER_TRANSFORM_URL").map(|url| url.trim_end_matches('/').to_string());
        let api_token = non_empty("ATELIER_API_TOKEN");

        let poll_interval = match non_empty("ATELIER_POLL_INTERVAL_MS") {
            Some(v) => Duration::from_millis(parse_positive("ATELIER_POLL_INTERVAL_MS", &v)?),
            None => defaults.poll_interval,
        };
        let poll_error_threshold = match non_empty("ATELIER_POLL_ERROR_THRESHOLD") {
            Some(v) => parse_positive("ATELIER_POLL_ERROR_THRESHOLD", &v)? as u32,
            None => defaults.poll_error_threshold,
        };
        let request_timeout = match non_empty("ATELIER_REQUEST_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_positive("ATELIER_REQUEST_TIMEOUT_SECS", &v)?),
            None => defaults.request_timeout,
        };

        Ok(Self {
            api_url,
            transform_url,
            api_token,
            poll_interval,
            poll_error_threshold,
            request_timeout,
        })
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(u64::from(n)),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "a positive integer",
            value: value.to_string(),
        }),
    }
}
