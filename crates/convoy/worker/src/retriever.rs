use crate::{WorkerError, WorkerResult};
use async_trait::async_trait;
use convoy_inventory::Inventory;
use convoy_types::{ClusterState, Operation};
use std::sync::Arc;

/// Resolves the desired cluster state an operation belongs to
#[async_trait]
pub trait ClusterStateRetriever: Send + Sync {
    async fn cluster_state(&self, operation: &Operation) -> WorkerResult<ClusterState>;
}

/// Serves one fixed cluster state, used for single-cluster local runs
pub struct PassThroughRetriever {
    state: ClusterState,
}

impl PassThroughRetriever {
    pub fn new(state: ClusterState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ClusterStateRetriever for PassThroughRetriever {
    async fn cluster_state(&self, operation: &Operation) -> WorkerResult<ClusterState> {
        if operation.runtime_id != *self.state.runtime_id() {
            return Err(WorkerError::UnknownCluster(operation.runtime_id.clone()));
        }
        Ok(self.state.clone())
    }
}

/// Looks up the configuration version of the operation in the inventory
pub struct InventoryRetriever {
    inventory: Arc<dyn Inventory>,
}

impl InventoryRetriever {
    pub fn new(inventory: Arc<dyn Inventory>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl ClusterStateRetriever for InventoryRetriever {
    async fn cluster_state(&self, operation: &Operation) -> WorkerResult<ClusterState> {
        Ok(self
            .inventory
            .get(&operation.runtime_id, operation.cluster_config_version)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use convoy_inventory::{ClusterRegistration, InMemoryInventory};
    use convoy_types::{
        Component, CorrelationId, OperationState, OperationType, RuntimeId, SchedulingId,
    };

    fn operation(runtime_id: &RuntimeId, config_version: i64) -> Operation {
        let now = Utc::now();
        Operation {
            scheduling_id: SchedulingId::generate(),
            correlation_id: CorrelationId::generate(),
            runtime_id: runtime_id.clone(),
            cluster_config_version: config_version,
            component: "istio".to_string(),
            priority: 1,
            kind: OperationType::Reconcile,
            state: OperationState::New,
            reason: String::new(),
            created: now,
            updated: now,
        }
    }

    fn registration(runtime_id: &RuntimeId) -> ClusterRegistration {
        ClusterRegistration {
            runtime_id: runtime_id.clone(),
            kubeconfig: "kubeconfig".to_string(),
            metadata: serde_json::Value::Null,
            kyma_version: "2.0.0".to_string(),
            kyma_profile: String::new(),
            components: vec![Component::new("istio", "istio-system")],
        }
    }

    #[tokio::test]
    async fn test_inventory_retriever_resolves_config_version() {
        let inventory = Arc::new(InMemoryInventory::default());
        let runtime_id = RuntimeId::new("runtime-1");
        let state = inventory.create_or_update(registration(&runtime_id)).await.unwrap();

        let retriever = InventoryRetriever::new(inventory.clone());
        let resolved = retriever
            .cluster_state(&operation(&runtime_id, state.configuration.version))
            .await
            .unwrap();
        assert_eq!(resolved.configuration.version, state.configuration.version);

        let missing = retriever
            .cluster_state(&operation(&RuntimeId::new("other"), 1))
            .await;
        assert!(matches!(missing, Err(WorkerError::Inventory(_))));
    }

    #[tokio::test]
    async fn test_pass_through_rejects_foreign_cluster() {
        let inventory = InMemoryInventory::default();
        let runtime_id = RuntimeId::new("runtime-1");
        let state = inventory.create_or_update(registration(&runtime_id)).await.unwrap();

        let retriever = PassThroughRetriever::new(state.clone());
        assert_eq!(
            retriever.cluster_state(&operation(&runtime_id, 1)).await.unwrap(),
            state
        );
        assert!(matches!(
            retriever.cluster_state(&operation(&RuntimeId::new("other"), 1)).await,
            Err(WorkerError::UnknownCluster(_))
        ));
    }
}
