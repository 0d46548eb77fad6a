//! Cluster status transitions around reconciliation runs

use crate::{SchedulerError, SchedulerResult};
use convoy_inventory::{Inventory, InventoryError};
use convoy_store::{
    CurrentlyReconciling, FilterMixer, ReconciliationRepository, StoreError, WithRuntimeId,
};
use convoy_types::{ClusterStatus, Reconciliation, RuntimeId, SchedulingId, SequenceConfig};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Couples inventory status changes with reconciliation lifecycle events.
///
/// Inventory and repository are separate stores, so transitions of this
/// process are serialised through one lock; the repository's unique
/// reconciliation per cluster still guards against other processes.
pub struct ClusterStatusTransition {
    inventory: Arc<dyn Inventory>,
    repo: Arc<dyn ReconciliationRepository>,
    lock: Mutex<()>,
}

impl ClusterStatusTransition {
    pub fn new(inventory: Arc<dyn Inventory>, repo: Arc<dyn ReconciliationRepository>) -> Self {
        Self {
            inventory,
            repo,
            lock: Mutex::new(()),
        }
    }

    pub fn inventory(&self) -> &Arc<dyn Inventory> {
        &self.inventory
    }

    pub fn repository(&self) -> &Arc<dyn ReconciliationRepository> {
        &self.repo
    }

    pub async fn start_reconciliation(
        &self,
        runtime_id: &RuntimeId,
        config_version: i64,
        cfg: &SequenceConfig,
    ) -> SchedulerResult<Reconciliation> {
        let _guard = self.lock.lock().await;

        let running = self
            .repo
            .get_reconciliations(
                &FilterMixer::new()
                    .with(WithRuntimeId(runtime_id.clone()))
                    .with(CurrentlyReconciling),
            )
            .await?;
        if !running.is_empty() {
            return Err(SchedulerError::AlreadyReconciling(runtime_id.clone()));
        }

        let state = self.inventory.get(runtime_id, config_version).await?;
        let prior = state.status.status;
        let target = if prior.is_reconcile_eligible() {
            ClusterStatus::Reconciling
        } else if prior.is_delete_eligible() {
            ClusterStatus::Deleting
        } else {
            return Err(SchedulerError::NotEligible {
                runtime_id: runtime_id.clone(),
                status: prior,
            });
        };

        let updated = self.inventory.update_status(&state, target).await?;
        tracing::debug!(
            runtime_id = %runtime_id,
            from = %prior,
            to = %target,
            "Cluster status updated"
        );

        let cfg = SequenceConfig {
            reconciliation_status: target,
            ..cfg.clone()
        };
        match self.repo.create_reconciliation(&updated, &cfg).await {
            Ok(reconciliation) => {
                tracing::info!(
                    runtime_id = %runtime_id,
                    scheduling_id = %reconciliation.scheduling_id,
                    status = %target,
                    "Reconciliation started"
                );
                Ok(reconciliation)
            }
            Err(err @ StoreError::EmptyComponents(_)) => {
                let status = if target.is_deletion() {
                    ClusterStatus::DeleteError
                } else {
                    ClusterStatus::ReconcileError
                };
                tracing::warn!(
                    runtime_id = %runtime_id,
                    status = %status,
                    "Cluster configuration has no components"
                );
                self.inventory.update_status(&updated, status).await?;
                Err(err.into())
            }
            Err(err) => {
                if matches!(err, StoreError::DuplicateReconciliation(_)) {
                    tracing::info!(runtime_id = %runtime_id, "Cluster is already enqueued");
                } else {
                    tracing::error!(runtime_id = %runtime_id, error = %err, "Failed to create reconciliation");
                }
                if let Err(e) = self.inventory.update_status(&updated, prior).await {
                    tracing::error!(
                        runtime_id = %runtime_id,
                        status = %prior,
                        error = %e,
                        "Failed to roll back cluster status"
                    );
                }
                Err(err.into())
            }
        }
    }

    pub async fn finish_reconciliation(
        &self,
        scheduling_id: &SchedulingId,
        status: ClusterStatus,
    ) -> SchedulerResult<Reconciliation> {
        let _guard = self.lock.lock().await;

        let reconciliation = self.repo.get_reconciliation(scheduling_id).await?;
        if reconciliation.finished {
            tracing::info!(
                scheduling_id = %scheduling_id,
                "Reconciliation was finished by a parallel process"
            );
            return Err(SchedulerError::AlreadyFinished(*scheduling_id));
        }

        let runtime_id = &reconciliation.runtime_id;
        match self
            .inventory
            .get(runtime_id, reconciliation.cluster_config_version)
            .await
        {
            Ok(state) if state.status.status.is_in_progress() => {
                self.inventory.update_status(&state, status).await?;
            }
            Ok(state) => {
                tracing::debug!(
                    runtime_id = %runtime_id,
                    status = %state.status.status,
                    "Cluster status no longer in progress, leaving it"
                );
            }
            Err(InventoryError::NotFound(_)) => {
                tracing::warn!(runtime_id = %runtime_id, "Cluster vanished from inventory");
            }
            Err(err) => return Err(err.into()),
        }

        if status == ClusterStatus::Deleted {
            match self.inventory.delete(runtime_id).await {
                Ok(()) | Err(InventoryError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let finished = self.repo.finish_reconciliation(scheduling_id, status).await?;
        tracing::info!(
            runtime_id = %runtime_id,
            scheduling_id = %scheduling_id,
            status = %status,
            "Reconciliation finished"
        );
        Ok(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convoy_inventory::{ClusterRegistration, InMemoryInventory};
    use convoy_store::{Filter, InMemoryReconciliationRepository, StoreResult};
    use convoy_types::{ClusterState, Component, CorrelationId, Operation, OperationState};

    /// Loses every creation race against another scheduler process
    struct ContendedRepository {
        inner: InMemoryReconciliationRepository,
    }

    #[async_trait]
    impl ReconciliationRepository for ContendedRepository {
        async fn create_reconciliation(
            &self,
            state: &ClusterState,
            _cfg: &SequenceConfig,
        ) -> StoreResult<Reconciliation> {
            Err(StoreError::DuplicateReconciliation(state.runtime_id().clone()))
        }

        async fn get_reconciliation(
            &self,
            scheduling_id: &SchedulingId,
        ) -> StoreResult<Reconciliation> {
            self.inner.get_reconciliation(scheduling_id).await
        }

        async fn get_reconciliations(
            &self,
            filter: &dyn Filter,
        ) -> StoreResult<Vec<Reconciliation>> {
            self.inner.get_reconciliations(filter).await
        }

        async fn finish_reconciliation(
            &self,
            scheduling_id: &SchedulingId,
            status: ClusterStatus,
        ) -> StoreResult<Reconciliation> {
            self.inner.finish_reconciliation(scheduling_id, status).await
        }

        async fn remove_reconciliation(&self, scheduling_id: &SchedulingId) -> StoreResult<()> {
            self.inner.remove_reconciliation(scheduling_id).await
        }

        async fn get_runtime_ids(&self) -> StoreResult<Vec<RuntimeId>> {
            self.inner.get_runtime_ids().await
        }

        async fn get_operations(
            &self,
            scheduling_id: &SchedulingId,
            states: &[OperationState],
        ) -> StoreResult<Vec<Operation>> {
            self.inner.get_operations(scheduling_id, states).await
        }

        async fn get_operation(
            &self,
            scheduling_id: &SchedulingId,
            correlation_id: &CorrelationId,
        ) -> StoreResult<Option<Operation>> {
            self.inner.get_operation(scheduling_id, correlation_id).await
        }

        async fn get_processable_operations(
            &self,
            max_parallel: usize,
        ) -> StoreResult<Vec<Operation>> {
            self.inner.get_processable_operations(max_parallel).await
        }

        async fn get_reconciling_operations(&self) -> StoreResult<Vec<Operation>> {
            self.inner.get_reconciling_operations().await
        }

        async fn compare_and_swap_operation_state(
            &self,
            scheduling_id: &SchedulingId,
            correlation_id: &CorrelationId,
            expected: OperationState,
            state: OperationState,
            reasons: &[String],
        ) -> StoreResult<Operation> {
            self.inner
                .compare_and_swap_operation_state(
                    scheduling_id,
                    correlation_id,
                    expected,
                    state,
                    reasons,
                )
                .await
        }
    }

    struct Fixture {
        inventory: Arc<InMemoryInventory>,
        repo: Arc<InMemoryReconciliationRepository>,
        transition: ClusterStatusTransition,
    }

    fn fixture() -> Fixture {
        let inventory = Arc::new(InMemoryInventory::new());
        let repo = Arc::new(InMemoryReconciliationRepository::new());
        let transition = ClusterStatusTransition::new(inventory.clone(), repo.clone());
        Fixture {
            inventory,
            repo,
            transition,
        }
    }

    async fn register(inventory: &InMemoryInventory, components: &[&str]) -> ClusterState {
        inventory
            .create_or_update(ClusterRegistration {
                runtime_id: RuntimeId::generate(),
                kubeconfig: "kubeconfig".to_string(),
                metadata: serde_json::Value::Null,
                kyma_version: "2.0.0".to_string(),
                kyma_profile: String::new(),
                components: components
                    .iter()
                    .map(|name| Component::new(*name, "kyma-system"))
                    .collect(),
            })
            .await
            .unwrap()
    }

    async fn status_of(inventory: &InMemoryInventory, runtime_id: &RuntimeId) -> ClusterStatus {
        inventory.get_latest(runtime_id).await.unwrap().status.status
    }

    #[tokio::test]
    async fn test_start_moves_cluster_to_reconciling() {
        let f = fixture();
        let state = register(&f.inventory, &["istio"]).await;

        let reconciliation = f
            .transition
            .start_reconciliation(state.runtime_id(), state.configuration.version, &SequenceConfig::default())
            .await
            .unwrap();

        assert_eq!(reconciliation.status, ClusterStatus::Reconciling);
        assert_eq!(
            status_of(&f.inventory, state.runtime_id()).await,
            ClusterStatus::Reconciling
        );

        let again = f
            .transition
            .start_reconciliation(state.runtime_id(), state.configuration.version, &SequenceConfig::default())
            .await;
        assert!(matches!(again, Err(SchedulerError::AlreadyReconciling(_))));
    }

    #[tokio::test]
    async fn test_start_deletion() {
        let f = fixture();
        let state = register(&f.inventory, &["istio"]).await;
        let marked = f.inventory.mark_for_deletion(state.runtime_id()).await.unwrap();

        let reconciliation = f
            .transition
            .start_reconciliation(state.runtime_id(), marked.configuration.version, &SequenceConfig::default())
            .await
            .unwrap();

        assert_eq!(reconciliation.status, ClusterStatus::Deleting);
        let operations = f
            .repo
            .get_operations(&reconciliation.scheduling_id, &[])
            .await
            .unwrap();
        assert!(operations
            .iter()
            .all(|op| op.kind == convoy_types::OperationType::Delete));
    }

    #[tokio::test]
    async fn test_empty_components_roll_forward_to_error() {
        let f = fixture();
        let state = register(&f.inventory, &[]).await;

        let result = f
            .transition
            .start_reconciliation(state.runtime_id(), state.configuration.version, &SequenceConfig::default())
            .await;

        assert!(matches!(
            result,
            Err(SchedulerError::Store(StoreError::EmptyComponents(_)))
        ));
        assert_eq!(
            status_of(&f.inventory, state.runtime_id()).await,
            ClusterStatus::ReconcileError
        );
    }

    #[tokio::test]
    async fn test_lost_creation_race_rolls_back_status() {
        let inventory = Arc::new(InMemoryInventory::new());
        let transition = ClusterStatusTransition::new(
            inventory.clone(),
            Arc::new(ContendedRepository {
                inner: InMemoryReconciliationRepository::new(),
            }),
        );
        let state = register(&inventory, &["istio"]).await;
        let prior = state.status.status;
        assert_ne!(prior, ClusterStatus::Reconciling);

        let result = transition
            .start_reconciliation(state.runtime_id(), state.configuration.version, &SequenceConfig::default())
            .await;

        assert!(matches!(
            result,
            Err(SchedulerError::Store(StoreError::DuplicateReconciliation(_)))
        ));
        assert_eq!(status_of(&inventory, state.runtime_id()).await, prior);
    }

    #[tokio::test]
    async fn test_ineligible_status_is_rejected() {
        let f = fixture();
        let state = register(&f.inventory, &["istio"]).await;
        f.inventory
            .update_status(&state, ClusterStatus::Deleting)
            .await
            .unwrap();

        let result = f
            .transition
            .start_reconciliation(state.runtime_id(), state.configuration.version, &SequenceConfig::default())
            .await;
        assert!(matches!(result, Err(SchedulerError::NotEligible { .. })));
    }

    #[tokio::test]
    async fn test_finish_updates_inventory_once() {
        let f = fixture();
        let state = register(&f.inventory, &["istio"]).await;
        let reconciliation = f
            .transition
            .start_reconciliation(state.runtime_id(), state.configuration.version, &SequenceConfig::default())
            .await
            .unwrap();

        let finished = f
            .transition
            .finish_reconciliation(&reconciliation.scheduling_id, ClusterStatus::Ready)
            .await
            .unwrap();
        assert!(finished.finished);
        assert_eq!(
            status_of(&f.inventory, state.runtime_id()).await,
            ClusterStatus::Ready
        );

        let again = f
            .transition
            .finish_reconciliation(&reconciliation.scheduling_id, ClusterStatus::Ready)
            .await;
        assert!(matches!(again, Err(SchedulerError::AlreadyFinished(_))));

        let unknown = f
            .transition
            .finish_reconciliation(&SchedulingId::generate(), ClusterStatus::Ready)
            .await;
        assert!(matches!(unknown, Err(SchedulerError::Store(StoreError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_finish_deleted_removes_cluster() {
        let f = fixture();
        let state = register(&f.inventory, &["istio"]).await;
        let marked = f.inventory.mark_for_deletion(state.runtime_id()).await.unwrap();
        let reconciliation = f
            .transition
            .start_reconciliation(state.runtime_id(), marked.configuration.version, &SequenceConfig::default())
            .await
            .unwrap();

        f.transition
            .finish_reconciliation(&reconciliation.scheduling_id, ClusterStatus::Deleted)
            .await
            .unwrap();

        assert!(matches!(
            f.inventory.get_latest(state.runtime_id()).await,
            Err(InventoryError::NotFound(_))
        ));
        let stored = f
            .repo
            .get_reconciliation(&reconciliation.scheduling_id)
            .await
            .unwrap();
        assert!(stored.finished);
        assert_eq!(stored.status, ClusterStatus::Deleted);
    }
}
