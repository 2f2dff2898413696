use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::exporter::RetryPolicy;

/// What happens when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued record to admit the new one. The default:
    /// under load, telemetry prefers freshness over completeness.
    DropOldest,
    /// The producer waits for space, up to `timeout` (`None` waits
    /// indefinitely), then fails with `QueueFull`.
    Block { timeout: Option<Duration> },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error(
        "TELPIPE_OVERFLOW_POLICY has invalid value: {0} (expected \"drop-oldest\" or \"block\")"
    )]
    InvalidOverflowPolicy(String),

    #[error("backoff_base ({base:?}) must not exceed backoff_max ({max:?})")]
    BackoffRange { base: Duration, max: Duration },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Size trigger: a batch is dispatched as soon as it holds this many
    /// records.
    pub max_batch_size: usize,
    /// Delay trigger: a partial batch is dispatched once this long has
    /// passed since its first record arrived.
    pub max_delay: Duration,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Total export attempts per batch, including the first.
    pub max_retry_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Timeout for a single export attempt.
    pub export_timeout: Duration,
    /// How long `stop` may spend draining outstanding work.
    pub shutdown_deadline: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_batch_size: 512,
            max_delay: Duration::from_secs(5),
            queue_capacity: 2048,
            overflow_policy: OverflowPolicy::DropOldest,
            max_retry_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(5),
            export_timeout: Duration::from_secs(5),
            shutdown_deadline: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Read overrides from `TELPIPE_*` environment variables on top of the
    /// defaults, then validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("TELPIPE_"))
            .collect();
        let config = Self::parse(&vars)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        Ok(Self {
            max_batch_size: parse_count(vars, "TELPIPE_MAX_BATCH_SIZE", defaults.max_batch_size)?,
            max_delay: parse_duration_ms(vars, "TELPIPE_MAX_DELAY_MS", defaults.max_delay)?,
            queue_capacity: parse_count(vars, "TELPIPE_QUEUE_CAPACITY", defaults.queue_capacity)?,
            overflow_policy: parse_overflow_policy(vars)?,
            max_retry_attempts: parse_count(
                vars,
                "TELPIPE_MAX_RETRY_ATTEMPTS",
                defaults.max_retry_attempts,
            )?,
            backoff_base: parse_duration_ms(vars, "TELPIPE_BACKOFF_BASE_MS", defaults.backoff_base)?,
            backoff_max: parse_duration_ms(vars, "TELPIPE_BACKOFF_MAX_MS", defaults.backoff_max)?,
            export_timeout: parse_duration_ms(
                vars,
                "TELPIPE_EXPORT_TIMEOUT_MS",
                defaults.export_timeout,
            )?,
            shutdown_deadline: parse_duration_ms(
                vars,
                "TELPIPE_SHUTDOWN_DEADLINE_MS",
                defaults.shutdown_deadline,
            )?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroValue("max_batch_size"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroValue("queue_capacity"));
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::ZeroValue("max_retry_attempts"));
        }
        if self.max_delay.is_zero() {
            return Err(ConfigError::ZeroValue("max_delay"));
        }
        if self.export_timeout.is_zero() {
            return Err(ConfigError::ZeroValue("export_timeout"));
        }
        if self.backoff_base > self.backoff_max {
            return Err(ConfigError::BackoffRange {
                base: self.backoff_base,
                max: self.backoff_max,
            });
        }
        Ok(())
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            backoff_base: self.backoff_base,
            backoff_max: self.backoff_max,
        }
    }
}

fn parse_count<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(default),
    }
}

fn parse_overflow_policy(vars: &HashMap<String, String>) -> Result<OverflowPolicy, ConfigError> {
    match vars.get("TELPIPE_OVERFLOW_POLICY").map(|s| s.as_str()) {
        Some("drop-oldest") | None => Ok(OverflowPolicy::DropOldest),
        Some("block") => {
            // 0 or absent means wait indefinitely.
            let timeout =
                match parse_duration_ms(vars, "TELPIPE_BLOCK_TIMEOUT_MS", Duration::ZERO)? {
                    d if d.is_zero() => None,
                    d => Some(d),
                };
            Ok(OverflowPolicy::Block { timeout })
        }
        Some(other) => Err(ConfigError::InvalidOverflowPolicy(other.to_owned())),
    }
}

#[cfg(test)]
mod tests;
