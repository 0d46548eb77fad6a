//! Repository backend selection

use crate::config::StorageConfig;
use crate::error::DaemonResult;
use convoy_store::{
    InMemoryReconciliationRepository, PostgresReconciliationRepository, ReconciliationRepository,
};
use std::sync::Arc;

/// Open the reconciliation repository described by `config`.
pub async fn connect(config: &StorageConfig) -> DaemonResult<Arc<dyn ReconciliationRepository>> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage, reconciliations are lost on restart");
            Ok(Arc::new(InMemoryReconciliationRepository::new()))
        }
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let repo = PostgresReconciliationRepository::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            tracing::info!(max_connections, "Connected to PostgreSQL");
            Ok(Arc::new(repo))
        }
    }
}
