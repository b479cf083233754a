// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;

use crate::error::ConfigError;
use crate::logs::constants;
use crate::logs::ResolverConfig;
use crate::sink::{RetryStrategy, SinkConfig};

/// Indexer configuration, read from `CI_LOGS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory scanned for extracted log files
    pub data_dir: PathBuf,
    /// Base URL of the index backend
    pub index_url: String,
    pub index_name: String,
    pub bulk_actions: usize,
    pub bulk_size_bytes: usize,
    pub flush_interval: Duration,
    pub concurrent_requests: usize,
    pub queue_capacity: usize,
    pub retry_backoff: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub request_timeout: Duration,
    /// Bounded wait when closing the sink
    pub close_timeout: Duration,
    /// Subtracted from epoch timestamps found in build names
    pub tz_correction_hours: i64,
    pub detect_day_rollover: bool,
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            index_url: "http://localhost:9200".to_string(),
            index_name: constants::DEFAULT_INDEX_NAME.to_string(),
            bulk_actions: constants::DEFAULT_BULK_ACTIONS,
            bulk_size_bytes: constants::DEFAULT_BULK_SIZE_BYTES,
            flush_interval: constants::DEFAULT_FLUSH_INTERVAL,
            concurrent_requests: constants::DEFAULT_CONCURRENT_REQUESTS,
            queue_capacity: constants::DEFAULT_QUEUE_CAPACITY,
            retry_backoff: constants::DEFAULT_RETRY_BACKOFF,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            request_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(60),
            tz_correction_hours: constants::DEFAULT_TZ_CORRECTION_HOURS,
            detect_day_rollover: false,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup. Unparseable
    /// numbers fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let number = |key: &str, default: u64| parse_or(&lookup, key, default);

        let config = Self {
            data_dir: lookup("CI_LOGS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            index_url: lookup("CI_LOGS_INDEX_URL").unwrap_or(defaults.index_url),
            index_name: lookup("CI_LOGS_INDEX_NAME").unwrap_or(defaults.index_name),
            bulk_actions: parse_or(&lookup, "CI_LOGS_BULK_ACTIONS", defaults.bulk_actions),
            bulk_size_bytes: parse_or(&lookup, "CI_LOGS_BULK_SIZE_BYTES", defaults.bulk_size_bytes),
            flush_interval: Duration::from_secs(number(
                "CI_LOGS_FLUSH_INTERVAL_SECS",
                defaults.flush_interval.as_secs(),
            )),
            concurrent_requests: parse_or(
                &lookup,
                "CI_LOGS_CONCURRENT_REQUESTS",
                defaults.concurrent_requests,
            ),
            queue_capacity: parse_or(&lookup, "CI_LOGS_QUEUE_CAPACITY", defaults.queue_capacity),
            retry_backoff: Duration::from_millis(number(
                "CI_LOGS_RETRY_BACKOFF_MS",
                u64::try_from(defaults.retry_backoff.as_millis()).unwrap_or(1000),
            )),
            max_retries: parse_or(&lookup, "CI_LOGS_MAX_RETRIES", defaults.max_retries),
            request_timeout: Duration::from_secs(number(
                "CI_LOGS_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            close_timeout: Duration::from_secs(number(
                "CI_LOGS_CLOSE_TIMEOUT_SECS",
                defaults.close_timeout.as_secs(),
            )),
            tz_correction_hours: parse_or(
                &lookup,
                "CI_LOGS_TZ_CORRECTION_HOURS",
                defaults.tz_correction_hours,
            ),
            detect_day_rollover: lookup("CI_LOGS_DETECT_DAY_ROLLOVER")
                .map(|val| matches!(val.to_lowercase().as_str(), "true" | "1"))
                .unwrap_or(defaults.detect_day_rollover),
            https_proxy: lookup("CI_LOGS_HTTPS_PROXY").or_else(|| lookup("HTTPS_PROXY")),
            log_level: lookup("CI_LOGS_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("CI_LOGS_BULK_ACTIONS", self.bulk_actions as u128),
            ("CI_LOGS_BULK_SIZE_BYTES", self.bulk_size_bytes as u128),
            ("CI_LOGS_FLUSH_INTERVAL_SECS", self.flush_interval.as_millis()),
            ("CI_LOGS_CONCURRENT_REQUESTS", self.concurrent_requests as u128),
            ("CI_LOGS_QUEUE_CAPACITY", self.queue_capacity as u128),
            ("CI_LOGS_REQUEST_TIMEOUT_SECS", self.request_timeout.as_millis()),
            ("CI_LOGS_CLOSE_TIMEOUT_SECS", self.close_timeout.as_millis()),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }

        if self.index_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "CI_LOGS_INDEX_URL cannot be empty".to_string(),
            ));
        }
        if self.index_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "CI_LOGS_INDEX_NAME cannot be empty".to_string(),
            ));
        }
        if TimeDelta::try_hours(self.tz_correction_hours).is_none() {
            return Err(ConfigError::Invalid(format!(
                "CI_LOGS_TZ_CORRECTION_HOURS out of range: {}",
                self.tz_correction_hours
            )));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            index: self.index_name.clone(),
            max_actions: self.bulk_actions,
            max_size_bytes: self.bulk_size_bytes,
            flush_interval: self.flush_interval,
            concurrent_requests: self.concurrent_requests,
            queue_capacity: self.queue_capacity,
            retry_strategy: RetryStrategy::ConstantBackoff(
                self.max_retries,
                u64::try_from(self.retry_backoff.as_millis()).unwrap_or(u64::MAX),
            ),
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            tz_correction: TimeDelta::try_hours(self.tz_correction_hours).unwrap_or_else(TimeDelta::zero),
            detect_day_rollover: self.detect_day_rollover,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|val| val.trim().parse::<T>().ok())
        .unwrap_or(default)
}
