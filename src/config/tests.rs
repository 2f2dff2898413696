use std::collections::HashMap;
use std::time::Duration;

use super::*;

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn empty_environment_yields_defaults() {
    let config = Config::parse(&vars(&[])).unwrap();
    assert_eq!(config.max_batch_size, 512);
    assert_eq!(config.max_delay, Duration::from_secs(5));
    assert_eq!(config.queue_capacity, 2048);
    assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
    assert_eq!(config.max_retry_attempts, 3);
    config.validate().unwrap();
}

#[test]
fn overrides_numeric_settings() {
    let config = Config::parse(&vars(&[
        ("TELPIPE_MAX_BATCH_SIZE", "64"),
        ("TELPIPE_MAX_DELAY_MS", "250"),
        ("TELPIPE_QUEUE_CAPACITY", "100"),
        ("TELPIPE_MAX_RETRY_ATTEMPTS", "5"),
        ("TELPIPE_SHUTDOWN_DEADLINE_MS", "10000"),
    ]))
    .unwrap();
    assert_eq!(config.max_batch_size, 64);
    assert_eq!(config.max_delay, Duration::from_millis(250));
    assert_eq!(config.queue_capacity, 100);
    assert_eq!(config.max_retry_attempts, 5);
    assert_eq!(config.shutdown_deadline, Duration::from_secs(10));
}

#[test]
fn rejects_non_numeric_value() {
    let err = Config::parse(&vars(&[("TELPIPE_MAX_BATCH_SIZE", "lots")])).unwrap_err();
    assert!(
        matches!(err, ConfigError::InvalidNumeric(ref name, _) if name == "TELPIPE_MAX_BATCH_SIZE"),
        "should reject non-numeric batch size"
    );
}

#[test]
fn parses_block_policy_with_timeout() {
    let config = Config::parse(&vars(&[
        ("TELPIPE_OVERFLOW_POLICY", "block"),
        ("TELPIPE_BLOCK_TIMEOUT_MS", "1500"),
    ]))
    .unwrap();
    assert_eq!(
        config.overflow_policy,
        OverflowPolicy::Block {
            timeout: Some(Duration::from_millis(1500)),
        }
    );
}

#[test]
fn block_policy_without_timeout_waits_indefinitely() {
    let config = Config::parse(&vars(&[("TELPIPE_OVERFLOW_POLICY", "block")])).unwrap();
    assert_eq!(config.overflow_policy, OverflowPolicy::Block { timeout: None });
}

#[test]
fn rejects_unknown_overflow_policy() {
    let err = Config::parse(&vars(&[("TELPIPE_OVERFLOW_POLICY", "reject-newest")])).unwrap_err();
    assert!(
        matches!(err, ConfigError::InvalidOverflowPolicy(_)),
        "should reject unknown policy"
    );
}

#[test]
fn validate_rejects_zero_batch_size() {
    let config = Config {
        max_batch_size: 0,
        ..Config::default()
    };
    assert!(matches!(
        config.validate().unwrap_err(),
        ConfigError::ZeroValue("max_batch_size")
    ));
}

#[test]
fn validate_rejects_zero_queue_capacity() {
    let config = Config {
        queue_capacity: 0,
        ..Config::default()
    };
    assert!(matches!(
        config.validate().unwrap_err(),
        ConfigError::ZeroValue("queue_capacity")
    ));
}

#[test]
fn validate_rejects_inverted_backoff_range() {
    let config = Config {
        backoff_base: Duration::from_secs(10),
        backoff_max: Duration::from_secs(1),
        ..Config::default()
    };
    assert!(matches!(
        config.validate().unwrap_err(),
        ConfigError::BackoffRange { .. }
    ));
}
