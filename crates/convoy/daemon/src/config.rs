//! Configuration for convoyd

use convoy_invoker::CallbackAddress;
use convoy_scheduler::{BookkeeperConfig, CleanerConfig, SchedulerConfig};
use convoy_worker::WorkerPoolConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub worker: WorkerPoolConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub bookkeeper: BookkeeperConfig,

    #[serde(default)]
    pub cleaner: CleanerConfig,

    #[serde(default)]
    pub invoker: InvokerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
        }
    }
}

/// Reconciliation repository backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        url: String,

        #[serde(default = "default_pool_size")]
        max_connections: u32,

        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

impl StorageConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageConfig::Memory => "memory",
            StorageConfig::Postgres { .. } => "postgres",
        }
    }
}

/// Remote component reconcilers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokerConfig {
    /// Reconciler service URL per component name
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,

    /// Endpoint entry serving components without a dedicated one
    #[serde(default = "default_fallback")]
    pub fallback: Option<String>,

    /// Address reconcilers use to report back to this daemon
    #[serde(default)]
    pub callback: CallbackAddress,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            endpoints: BTreeMap::new(),
            fallback: default_fallback(),
            callback: CallbackAddress::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_fallback() -> Option<String> {
    Some("base".to_string())
}

fn default_request_timeout() -> u64 {
    30
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Environment variables use the `CONVOY_` prefix and `__` between
    /// nesting levels, e.g. `CONVOY_WORKER__POOL_SIZE=100`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CONVOY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert_eq!(config.invoker.fallback.as_deref(), Some("base"));
        assert_eq!(config.scheduler.watch_interval_secs, 60);
        assert_eq!(config.bookkeeper.orphan_timeout_secs, 600);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.worker.pool_size, 500);
        assert_eq!(config.cleaner.interval_secs, 3600);
        assert_eq!(config.invoker.callback.port, 8080);
    }

    #[test]
    fn test_postgres_storage_from_json() {
        let storage: StorageConfig = serde_json::from_value(serde_json::json!({
            "type": "postgres",
            "url": "postgres://localhost/convoy"
        }))
        .unwrap();
        match storage {
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                assert_eq!(url, "postgres://localhost/convoy");
                assert_eq!(max_connections, 10);
                assert_eq!(connect_timeout_secs, 5);
            }
            StorageConfig::Memory => panic!("expected postgres storage"),
        }
    }
}
