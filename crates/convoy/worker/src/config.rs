use crate::{WorkerError, WorkerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker pool configuration
///
/// Zero values fall back to the defaults, negative values are rejected by
/// [`WorkerPoolConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Maximum number of concurrently running workers
    pub pool_size: i64,

    /// Pause between two dispatch rounds
    pub check_interval_ms: i64,

    /// Invocation attempts per dispatched operation
    pub invoker_max_retries: i64,

    pub invoker_retry_delay_ms: i64,

    /// Dispatch cap per reconciliation and round
    pub max_parallel_operations: i64,

    /// Retries a component reconciler may spend on one operation
    pub max_operation_retries: i64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            check_interval_ms: default_check_interval_ms(),
            invoker_max_retries: default_invoker_max_retries(),
            invoker_retry_delay_ms: default_invoker_retry_delay_ms(),
            max_parallel_operations: default_max_parallel_operations(),
            max_operation_retries: default_max_operation_retries(),
        }
    }
}

fn default_pool_size() -> i64 {
    500
}

fn default_check_interval_ms() -> i64 {
    30_000
}

fn default_invoker_max_retries() -> i64 {
    5
}

fn default_invoker_retry_delay_ms() -> i64 {
    5_000
}

fn default_max_parallel_operations() -> i64 {
    25
}

fn default_max_operation_retries() -> i64 {
    5
}

/// Validated worker pool settings
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub pool_size: usize,
    pub check_interval: Duration,
    pub invoker_max_retries: u32,
    pub invoker_retry_delay: Duration,
    pub max_parallel_operations: usize,
    pub max_operation_retries: u32,
}

impl WorkerPoolConfig {
    pub fn validate(&self) -> WorkerResult<WorkerSettings> {
        Ok(WorkerSettings {
            pool_size: positive("pool_size", self.pool_size, default_pool_size())?,
            check_interval: Duration::from_millis(positive(
                "check_interval_ms",
                self.check_interval_ms,
                default_check_interval_ms(),
            )?),
            invoker_max_retries: positive(
                "invoker_max_retries",
                self.invoker_max_retries,
                default_invoker_max_retries(),
            )?,
            invoker_retry_delay: Duration::from_millis(positive(
                "invoker_retry_delay_ms",
                self.invoker_retry_delay_ms,
                default_invoker_retry_delay_ms(),
            )?),
            max_parallel_operations: positive(
                "max_parallel_operations",
                self.max_parallel_operations,
                default_max_parallel_operations(),
            )?,
            max_operation_retries: positive(
                "max_operation_retries",
                self.max_operation_retries,
                default_max_operation_retries(),
            )?,
        })
    }
}

fn positive<T: TryFrom<i64>>(field: &str, value: i64, default: i64) -> WorkerResult<T> {
    let value = match value {
        0 => default,
        v if v < 0 => {
            return Err(WorkerError::InvalidConfig(format!(
                "{field} must not be negative (got {v})"
            )))
        }
        v => v,
    };
    T::try_from(value)
        .map_err(|_| WorkerError::InvalidConfig(format!("{field} is out of range (got {value})")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = WorkerPoolConfig::default().validate().unwrap();
        assert_eq!(settings.pool_size, 500);
        assert_eq!(settings.check_interval, Duration::from_secs(30));
        assert_eq!(settings.invoker_max_retries, 5);
        assert_eq!(settings.invoker_retry_delay, Duration::from_secs(5));
        assert_eq!(settings.max_parallel_operations, 25);
        assert_eq!(settings.max_operation_retries, 5);
    }

    #[test]
    fn test_zero_values_use_defaults() {
        let config = WorkerPoolConfig {
            pool_size: 0,
            check_interval_ms: 0,
            invoker_max_retries: 2,
            ..Default::default()
        };
        let settings = config.validate().unwrap();
        assert_eq!(settings.pool_size, 500);
        assert_eq!(settings.check_interval, Duration::from_secs(30));
        assert_eq!(settings.invoker_max_retries, 2);
    }

    #[test]
    fn test_negative_values_rejected() {
        let config = WorkerPoolConfig {
            invoker_retry_delay_ms: -1,
            ..Default::default()
        };
        match config.validate() {
            Err(WorkerError::InvalidConfig(msg)) => assert!(msg.contains("invoker_retry_delay_ms")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: WorkerPoolConfig =
            serde_json::from_str(r#"{"pool_size": 10, "check_interval_ms": 250}"#).unwrap();
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.invoker_max_retries, 5);
    }
}
