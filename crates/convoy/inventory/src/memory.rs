//! In-memory inventory for local runs and tests

use crate::{ClusterRegistration, Inventory, InventoryError, InventoryResult};
use async_trait::async_trait;
use chrono::Utc;
use convoy_types::{
    ClusterConfiguration, ClusterInfo, ClusterState, ClusterStatus, ClusterStatusRecord, RuntimeId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct ClusterEntry {
    cluster: ClusterInfo,
    /// Ascending by version
    configurations: Vec<ClusterConfiguration>,
    /// Ascending by id
    statuses: Vec<ClusterStatusRecord>,
}

impl ClusterEntry {
    fn state(&self, config_version: i64) -> InventoryResult<ClusterState> {
        let configuration = self
            .configurations
            .iter()
            .find(|c| c.version == config_version)
            .ok_or_else(|| {
                InventoryError::NotFound(format!(
                    "configuration {} of cluster {}",
                    config_version, self.cluster.runtime_id
                ))
            })?;
        let status = self
            .statuses
            .iter()
            .rev()
            .find(|s| s.config_version == config_version)
            .ok_or_else(|| {
                InventoryError::NotFound(format!(
                    "status of configuration {} of cluster {}",
                    config_version, self.cluster.runtime_id
                ))
            })?;

        Ok(ClusterState {
            cluster: self.cluster.clone(),
            configuration: configuration.clone(),
            status: status.clone(),
        })
    }

    fn latest_state(&self) -> InventoryResult<ClusterState> {
        let version = self
            .configurations
            .last()
            .map(|c| c.version)
            .ok_or_else(|| InventoryError::NotFound(self.cluster.runtime_id.to_string()))?;
        self.state(version)
    }
}

/// In-memory inventory
#[derive(Debug, Clone)]
pub struct InMemoryInventory {
    clusters: Arc<RwLock<HashMap<RuntimeId, ClusterEntry>>>,
    sequence: Arc<AtomicI64>,
}

impl Default for InMemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self {
            clusters: Arc::new(RwLock::new(HashMap::new())),
            sequence: Arc::new(AtomicI64::new(0)),
        }
    }

    fn next_id(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn status_record(
        &self,
        runtime_id: &RuntimeId,
        cluster_version: i64,
        config_version: i64,
        status: ClusterStatus,
    ) -> ClusterStatusRecord {
        ClusterStatusRecord {
            id: self.next_id(),
            runtime_id: runtime_id.clone(),
            cluster_version,
            config_version,
            status,
            created: Utc::now(),
        }
    }
}

#[async_trait]
impl Inventory for InMemoryInventory {
    async fn clusters_to_reconcile(
        &self,
        reconcile_interval: Duration,
    ) -> InventoryResult<Vec<ClusterState>> {
        let interval = chrono::Duration::from_std(reconcile_interval)
            .map_err(|e| InventoryError::InvalidInput(e.to_string()))?;
        let now = Utc::now();

        let clusters = self.clusters.read().await;
        let mut due = Vec::new();
        for entry in clusters.values() {
            let state = entry.latest_state()?;
            let pending = matches!(
                state.status.status,
                ClusterStatus::ReconcilePending | ClusterStatus::DeletePending
            );
            let outdated = !reconcile_interval.is_zero()
                && state.status.status == ClusterStatus::Ready
                && now - state.status.created >= interval;
            if pending || outdated {
                due.push(state);
            }
        }
        due.sort_by_key(|state| state.status.created);
        Ok(due)
    }

    async fn get(
        &self,
        runtime_id: &RuntimeId,
        config_version: i64,
    ) -> InventoryResult<ClusterState> {
        let clusters = self.clusters.read().await;
        clusters
            .get(runtime_id)
            .ok_or_else(|| InventoryError::NotFound(runtime_id.to_string()))?
            .state(config_version)
    }

    async fn get_latest(&self, runtime_id: &RuntimeId) -> InventoryResult<ClusterState> {
        let clusters = self.clusters.read().await;
        clusters
            .get(runtime_id)
            .ok_or_else(|| InventoryError::NotFound(runtime_id.to_string()))?
            .latest_state()
    }

    async fn update_status(
        &self,
        state: &ClusterState,
        status: ClusterStatus,
    ) -> InventoryResult<ClusterState> {
        let mut clusters = self.clusters.write().await;
        let entry = clusters
            .get_mut(state.runtime_id())
            .ok_or_else(|| InventoryError::NotFound(state.runtime_id().to_string()))?;

        let current = entry.state(state.configuration.version)?;
        if current.status.status == status {
            return Ok(current);
        }

        let record = self.status_record(
            state.runtime_id(),
            entry.cluster.version,
            state.configuration.version,
            status,
        );
        tracing::debug!(
            runtime_id = %state.runtime_id(),
            from = %current.status.status,
            to = %status,
            "Cluster status updated"
        );
        entry.statuses.push(record);
        entry.state(state.configuration.version)
    }

    async fn delete(&self, runtime_id: &RuntimeId) -> InventoryResult<()> {
        let mut clusters = self.clusters.write().await;
        clusters
            .remove(runtime_id)
            .map(|_| ())
            .ok_or_else(|| InventoryError::NotFound(runtime_id.to_string()))
    }

    async fn create_or_update(
        &self,
        registration: ClusterRegistration,
    ) -> InventoryResult<ClusterState> {
        if registration.runtime_id.as_str().is_empty() {
            return Err(InventoryError::InvalidInput(
                "runtime id must not be empty".to_string(),
            ));
        }

        let mut clusters = self.clusters.write().await;
        let runtime_id = registration.runtime_id.clone();

        let entry = clusters
            .entry(runtime_id.clone())
            .or_insert_with(|| ClusterEntry {
                cluster: ClusterInfo {
                    runtime_id: runtime_id.clone(),
                    version: self.next_id(),
                    kubeconfig: registration.kubeconfig.clone(),
                    metadata: registration.metadata.clone(),
                },
                configurations: Vec::new(),
                statuses: Vec::new(),
            });

        let cluster_changed = entry.cluster.kubeconfig != registration.kubeconfig
            || entry.cluster.metadata != registration.metadata;
        if cluster_changed {
            entry.cluster.version = self.next_id();
            entry.cluster.kubeconfig = registration.kubeconfig.clone();
            entry.cluster.metadata = registration.metadata.clone();
        }

        if let Some(latest) = entry.configurations.last() {
            let unchanged = !cluster_changed
                && latest.kyma_version == registration.kyma_version
                && latest.kyma_profile == registration.kyma_profile
                && latest.components == registration.components;
            if unchanged {
                return entry.latest_state();
            }
        }

        let configuration = ClusterConfiguration {
            runtime_id: runtime_id.clone(),
            version: self.next_id(),
            cluster_version: entry.cluster.version,
            kyma_version: registration.kyma_version,
            kyma_profile: registration.kyma_profile,
            components: registration.components,
        };
        let status = self.status_record(
            &runtime_id,
            entry.cluster.version,
            configuration.version,
            ClusterStatus::ReconcilePending,
        );
        entry.configurations.push(configuration);
        entry.statuses.push(status);

        tracing::info!(runtime_id = %runtime_id, "Cluster registered");
        entry.latest_state()
    }

    async fn mark_for_deletion(&self, runtime_id: &RuntimeId) -> InventoryResult<ClusterState> {
        let state = self.get_latest(runtime_id).await?;
        self.update_status(&state, ClusterStatus::DeletePending).await
    }
}
