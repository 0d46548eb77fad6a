//! Fixtures shared by invoker tests

use crate::Params;
use chrono::Utc;
use convoy_store::{InMemoryReconciliationRepository, ReconciliationRepository};
use convoy_types::{
    ClusterConfiguration, ClusterInfo, ClusterState, ClusterStatus, ClusterStatusRecord,
    Component, Operation, RuntimeId, SequenceConfig,
};
use std::sync::Arc;

pub(crate) fn cluster_state(components: &[&str]) -> ClusterState {
    let runtime_id = RuntimeId::generate();
    ClusterState {
        cluster: ClusterInfo {
            runtime_id: runtime_id.clone(),
            version: 1,
            kubeconfig: "kubeconfig".to_string(),
            metadata: serde_json::json!({}),
        },
        configuration: ClusterConfiguration {
            runtime_id: runtime_id.clone(),
            version: 1,
            cluster_version: 1,
            kyma_version: "2.0.0".to_string(),
            kyma_profile: "evaluation".to_string(),
            components: components
                .iter()
                .map(|name| Component::new(*name, "kyma-system"))
                .collect(),
        },
        status: ClusterStatusRecord {
            id: 1,
            runtime_id,
            cluster_version: 1,
            config_version: 1,
            status: ClusterStatus::Reconciling,
            created: Utc::now(),
        },
    }
}

/// Repository holding one reconciliation of `component`, plus its operation.
pub(crate) async fn fixture(
    component: &str,
) -> (Arc<InMemoryReconciliationRepository>, ClusterState, Operation) {
    let repo = Arc::new(InMemoryReconciliationRepository::new());
    let state = cluster_state(&[component]);
    let reconciliation = repo
        .create_reconciliation(&state, &SequenceConfig::default())
        .await
        .unwrap();
    let operation = repo
        .get_operations(&reconciliation.scheduling_id, &[])
        .await
        .unwrap()
        .into_iter()
        .find(|op| op.component == component)
        .unwrap();
    (repo, state, operation)
}

pub(crate) fn params(state: &ClusterState, operation: &Operation) -> Params {
    Params {
        component: state
            .configuration
            .component(&operation.component)
            .cloned()
            .unwrap(),
        components_ready: Vec::new(),
        cluster_state: state.clone(),
        scheduling_id: operation.scheduling_id,
        correlation_id: operation.correlation_id,
        kind: operation.kind,
        max_operation_retries: 5,
    }
}
