// Process configuration, built once at startup from environment variables.
// No ambient env lookups at call sites: everything the pipeline needs is
// read here, validated, and passed down as a value.

use std::env;
use std::time::Duration;

use crate::errors::ConfigError;

/// All tunables for the ingestion core, with the documented defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres DSN. Required.
    pub db_url: String,
    /// Credential for the external LLM. Required for processing workers;
    /// fetch-only commands run without one.
    pub llm_api_key: Option<String>,
    /// Base URL of an OpenAI-compatible completion endpoint.
    pub llm_api_base: String,
    pub fetcher_workers: usize,
    pub processor_workers: usize,
    pub sync_interval: Duration,
    pub retry_sweep_interval: Duration,
    pub job_max_attempts: i32,
    pub job_lease: Duration,
    pub vendor_min_delay: Duration,
    pub http_timeout: Duration,
    pub llm_timeout: Duration,
    pub sync_days_back: i64,
    pub sync_days_forward: i64,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_url = env::var("DB_URL").map_err(|_| ConfigError::Missing("DB_URL"))?;

        let config = Self {
            db_url,
            llm_api_key: env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            llm_api_base: env::var("LLM_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            fetcher_workers: parse_var("FETCHER_WORKERS", 4)?,
            processor_workers: parse_var("PROCESSOR_WORKERS", 16)?,
            sync_interval: Duration::from_secs(parse_var("SYNC_INTERVAL_HOURS", 24u64)? * 3600),
            retry_sweep_interval: Duration::from_secs(
                parse_var("RETRY_SWEEP_INTERVAL_HOURS", 1u64)? * 3600,
            ),
            job_max_attempts: parse_var("JOB_MAX_ATTEMPTS", 3i32)?,
            job_lease: Duration::from_secs(parse_var("JOB_LEASE_SECONDS", 600u64)?),
            vendor_min_delay: Duration::from_millis(parse_var("VENDOR_MIN_DELAY_MS", 3000u64)?),
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECONDS", 30u64)?),
            llm_timeout: Duration::from_secs(parse_var("LLM_TIMEOUT_SECONDS", 60u64)?),
            sync_days_back: parse_var("SYNC_DAYS_BACK", 14i64)?,
            sync_days_forward: parse_var("SYNC_DAYS_FORWARD", 60i64)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetcher_workers == 0 {
            return Err(ConfigError::Invalid {
                name: "FETCHER_WORKERS",
                value: "0".into(),
                reason: "at least one fetcher is required".into(),
            });
        }
        if self.processor_workers == 0 {
            return Err(ConfigError::Invalid {
                name: "PROCESSOR_WORKERS",
                value: "0".into(),
                reason: "at least one processor is required".into(),
            });
        }
        if self.job_max_attempts < 1 {
            return Err(ConfigError::Invalid {
                name: "JOB_MAX_ATTEMPTS",
                value: self.job_max_attempts.to_string(),
                reason: "must be >= 1".into(),
            });
        }
        if self.sync_days_back < 0 || self.sync_days_forward < 0 {
            return Err(ConfigError::Invalid {
                name: "SYNC_DAYS_BACK",
                value: format!("{}/{}", self.sync_days_back, self.sync_days_forward),
                reason: "sync window must be non-negative".into(),
            });
        }
        Ok(())
    }

    /// A config suitable for tests: local database, single workers, no LLM.
    pub fn for_tests(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            llm_api_key: None,
            llm_api_base: "https://api.openai.com/v1".to_string(),
            fetcher_workers: 1,
            processor_workers: 1,
            sync_interval: Duration::from_secs(24 * 3600),
            retry_sweep_interval: Duration::from_secs(3600),
            job_max_attempts: 3,
            job_lease: Duration::from_secs(600),
            vendor_min_delay: Duration::from_millis(0),
            http_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(60),
            sync_days_back: 14,
            sync_days_forward: 60,
            log_level: "INFO".to_string(),
        }
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + ToString,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
            reason: format!("expected a {}", std::any::type_name::<T>()),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documentation() {
        let config = Config::for_tests("postgres://localhost/engagic_test");
        assert_eq!(config.fetcher_workers, 1);
        assert_eq!(config.job_max_attempts, 3);
        assert_eq!(config.job_lease, Duration::from_secs(600));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = Config::for_tests("postgres://localhost/engagic_test");
        config.processor_workers = 0;
        assert!(config.validate().is_err());
    }
}
