//! Auth gate configuration.
//!
//! Loaded from environment variables with defaults suitable for Google-issued
//! ID tokens. The retry bound (`resolver::MAX_FETCH_ATTEMPTS`) is a constant,
//! not configuration.

use crate::auth::cache::DEFAULT_CACHE_TTL;
use crate::auth::fetcher::{DEFAULT_FETCH_TIMEOUT, DEFAULT_JWKS_URL};
use crate::auth::verifier::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Longest JWKS request timeout accepted from configuration.
pub const MAX_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Gate configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// URL of the provider's JWKS document.
    pub jwks_url: String,

    /// Required `hd` claim. `None` accepts any domain.
    pub domain: Option<String>,

    /// Required `aud` claim, if any.
    pub audience: Option<String>,

    /// Accepted `iss` values. Empty accepts any issuer.
    pub issuers: Vec<String>,

    /// How long a fetched key set is served (default: 3600).
    pub cache_ttl_seconds: u64,

    /// Timeout for one JWKS request (default: 5).
    pub fetch_timeout_seconds: u64,

    /// Clock skew tolerance for `exp`/`nbf` (default: 60).
    pub clock_skew_seconds: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            jwks_url: DEFAULT_JWKS_URL.to_string(),
            domain: None,
            audience: None,
            issuers: Vec::new(),
            cache_ttl_seconds: DEFAULT_CACHE_TTL.as_secs(),
            fetch_timeout_seconds: DEFAULT_FETCH_TIMEOUT.as_secs(),
            clock_skew_seconds: DEFAULT_CLOCK_SKEW.as_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JWKS URL: {0}")]
    InvalidJwksUrl(String),

    #[error("Invalid JWKS cache TTL configuration: {0}")]
    InvalidCacheTtl(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidClockSkew(String),
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_seconds<F>(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    error: F,
) -> Result<u64, ConfigError>
where
    F: Fn(String) -> ConfigError,
{
    match vars.get(name) {
        Some(value_str) => value_str.trim().parse::<u64>().map_err(|e| {
            error(format!(
                "{} must be a valid non-negative integer, got '{}': {}",
                name, value_str, e
            ))
        }),
        None => Ok(default),
    }
}

impl GateConfig {
    /// Default configuration restricted to `domain`.
    pub fn for_domain(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            domain: (!domain.is_empty()).then_some(domain),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwks_url = non_empty(vars, "JWKS_URL").unwrap_or_else(|| DEFAULT_JWKS_URL.to_string());
        if !(jwks_url.starts_with("https://") || jwks_url.starts_with("http://")) {
            return Err(ConfigError::InvalidJwksUrl(format!(
                "JWKS_URL must be an http(s) URL, got '{}'",
                jwks_url
            )));
        }
        if jwks_url.starts_with("http://") {
            tracing::warn!(target: "gate.config", url = %jwks_url, "JWKS_URL is not HTTPS");
        }

        let domain = non_empty(vars, "GATE_DOMAIN");
        let audience = non_empty(vars, "JWT_AUDIENCE");
        let issuers = non_empty(vars, "JWT_ISSUERS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|issuer| !issuer.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let cache_ttl_seconds = parse_seconds(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_CACHE_TTL.as_secs(),
            ConfigError::InvalidCacheTtl,
        )?;
        if cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidCacheTtl(
                "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }

        let fetch_timeout_seconds = parse_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_FETCH_TIMEOUT.as_secs(),
            ConfigError::InvalidFetchTimeout,
        )?;
        if fetch_timeout_seconds == 0 || fetch_timeout_seconds > MAX_FETCH_TIMEOUT_SECONDS {
            return Err(ConfigError::InvalidFetchTimeout(format!(
                "JWKS_FETCH_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                MAX_FETCH_TIMEOUT_SECONDS, fetch_timeout_seconds
            )));
        }

        let clock_skew_seconds = parse_seconds(
            vars,
            "JWT_CLOCK_SKEW_SECONDS",
            DEFAULT_CLOCK_SKEW.as_secs(),
            ConfigError::InvalidClockSkew,
        )?;
        if clock_skew_seconds > MAX_CLOCK_SKEW.as_secs() {
            return Err(ConfigError::InvalidClockSkew(format!(
                "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW.as_secs(),
                clock_skew_seconds
            )));
        }

        Ok(GateConfig {
            jwks_url,
            domain,
            audience,
            issuers,
            cache_ttl_seconds,
            fetch_timeout_seconds,
            clock_skew_seconds,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_seconds)
    }
}
