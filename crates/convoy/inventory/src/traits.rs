use crate::InventoryResult;
use async_trait::async_trait;
use convoy_types::{ClusterState, ClusterStatus, Component, RuntimeId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Desired state of a cluster as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRegistration {
    pub runtime_id: RuntimeId,
    #[serde(default)]
    pub kubeconfig: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub kyma_version: String,
    #[serde(default)]
    pub kyma_profile: String,
    #[serde(default)]
    pub components: Vec<Component>,
}

/// Source of cluster states and sink for cluster status changes
#[async_trait]
pub trait Inventory: Send + Sync {
    /// Clusters waiting for a reconciliation or a deletion.
    ///
    /// Ready clusters whose last status is older than `reconcile_interval`
    /// are included as well; a zero interval disables re-reconciliation.
    async fn clusters_to_reconcile(
        &self,
        reconcile_interval: Duration,
    ) -> InventoryResult<Vec<ClusterState>>;

    /// State of a specific configuration version
    async fn get(&self, runtime_id: &RuntimeId, config_version: i64)
        -> InventoryResult<ClusterState>;

    /// State of the newest configuration version
    async fn get_latest(&self, runtime_id: &RuntimeId) -> InventoryResult<ClusterState>;

    /// Record a new status for the configuration referenced by `state`
    async fn update_status(
        &self,
        state: &ClusterState,
        status: ClusterStatus,
    ) -> InventoryResult<ClusterState>;

    /// Remove a cluster with all its configurations and statuses
    async fn delete(&self, runtime_id: &RuntimeId) -> InventoryResult<()>;

    /// Register a cluster or a new configuration of it
    async fn create_or_update(&self, registration: ClusterRegistration)
        -> InventoryResult<ClusterState>;

    /// Flag the latest configuration of a cluster for deletion
    async fn mark_for_deletion(&self, runtime_id: &RuntimeId) -> InventoryResult<ClusterState>;
}
