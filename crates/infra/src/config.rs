//! Configuration loading and representation.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file. Every key has a fallback so an empty environment yields a working
//! in-process setup.

use std::time::Duration;

use courier_core::RetryPolicy;
use courier_observability::LogFormat;
use thiserror::Error;

pub const RETRY_BUDGET: &str = "COURIER_RETRY_BUDGET";
pub const BACKOFF_MS: &str = "COURIER_BACKOFF_MS";
pub const HTTP_TIMEOUT_SECS: &str = "COURIER_HTTP_TIMEOUT_SECS";
pub const MAX_IN_FLIGHT: &str = "COURIER_MAX_IN_FLIGHT";
pub const LOG_FORMAT: &str = "COURIER_LOG_FORMAT";
pub const DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to load .env file: {0}")]
    Dotenv(String),
}

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Name for logging
    pub name: String,
    /// Default retry budget and fixed backoff
    pub retry: RetryPolicy,
    /// Whole-request timeout of the HTTP transport
    pub http_timeout: Duration,
    /// Upper bound on concurrently running jobs (`None` = unbounded)
    pub max_in_flight: Option<usize>,
    pub log_format: LogFormat,
    /// Only needed when the Postgres ledger is used
    pub database_url: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: "async-executor".to_string(),
            retry: RetryPolicy::default(),
            http_timeout: Duration::from_secs(30),
            max_in_flight: None,
            log_format: LogFormat::Json,
            database_url: None,
        }
    }
}

impl ExecutorConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ConfigError::Dotenv(e.to_string())),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let budget = parse_or(&lookup, RETRY_BUDGET, defaults.retry.budget())?;
        let default_backoff_ms = defaults.retry.backoff().as_millis() as u64;
        let backoff_ms = parse_or(&lookup, BACKOFF_MS, default_backoff_ms)?;
        let timeout_secs = parse_or(&lookup, HTTP_TIMEOUT_SECS, defaults.http_timeout.as_secs())?;
        let max_in_flight = match lookup(MAX_IN_FLIGHT) {
            Some(raw) => Some(parse::<usize>(MAX_IN_FLIGHT, &raw)?).filter(|n| *n > 0),
            None => None,
        };
        let log_format = match lookup(LOG_FORMAT) {
            Some(raw) => raw.parse::<LogFormat>().map_err(|e| ConfigError::Invalid {
                key: LOG_FORMAT,
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.log_format,
        };

        if budget == 0 {
            return Err(ConfigError::Invalid {
                key: RETRY_BUDGET,
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        Ok(Self {
            name: defaults.name,
            retry: RetryPolicy::fixed(budget, Duration::from_millis(backoff_ms)),
            http_timeout: Duration::from_secs(timeout_secs),
            max_in_flight,
            log_format,
            database_url: lookup(DATABASE_URL),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = Some(max.max(1));
        self
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T, F>(lookup: &F, key: &'static str, fallback: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = ExecutorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.retry.budget(), 3);
        assert_eq!(config.retry.backoff(), Duration::from_secs(3));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.max_in_flight, None);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = ExecutorConfig::from_lookup(lookup(&[
            (RETRY_BUDGET, "5"),
            (BACKOFF_MS, "250"),
            (HTTP_TIMEOUT_SECS, "10"),
            (MAX_IN_FLIGHT, "64"),
            (LOG_FORMAT, "pretty"),
            (DATABASE_URL, "postgres://courier@localhost/courier"),
        ]))
        .unwrap();

        assert_eq!(config.retry, RetryPolicy::fixed(5, Duration::from_millis(250)));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.max_in_flight, Some(64));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://courier@localhost/courier")
        );
    }

    #[test]
    fn zero_max_in_flight_means_unbounded() {
        let config = ExecutorConfig::from_lookup(lookup(&[(MAX_IN_FLIGHT, "0")])).unwrap();
        assert_eq!(config.max_in_flight, None);
    }

    #[test]
    fn invalid_number_names_the_key() {
        let err = ExecutorConfig::from_lookup(lookup(&[(BACKOFF_MS, "soon")])).unwrap_err();
        match err {
            ConfigError::Invalid { key, value, .. } => {
                assert_eq!(key, BACKOFF_MS);
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(ExecutorConfig::from_lookup(lookup(&[(RETRY_BUDGET, "0")])).is_err());
    }
}
