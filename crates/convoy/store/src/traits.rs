use crate::filter::Filter;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use convoy_types::{
    ClusterState, ClusterStatus, CorrelationId, Operation, OperationState, Reconciliation,
    RuntimeId, SchedulingId, SequenceConfig,
};

/// Storage contract for reconciliations and their operations
#[async_trait]
pub trait ReconciliationRepository: Send + Sync {
    /// Create a reconciliation plus one operation per component, atomically.
    ///
    /// Fails with [`StoreError::DuplicateReconciliation`] while another
    /// reconciliation of the same cluster is unfinished and with
    /// [`StoreError::EmptyComponents`] if the configuration lists nothing.
    async fn create_reconciliation(
        &self,
        state: &ClusterState,
        cfg: &SequenceConfig,
    ) -> StoreResult<Reconciliation>;

    async fn get_reconciliation(&self, scheduling_id: &SchedulingId)
        -> StoreResult<Reconciliation>;

    /// Reconciliations passing `filter`, oldest first
    async fn get_reconciliations(&self, filter: &dyn Filter) -> StoreResult<Vec<Reconciliation>>;

    /// Mark a reconciliation finished with its final status and release its lock.
    async fn finish_reconciliation(
        &self,
        scheduling_id: &SchedulingId,
        status: ClusterStatus,
    ) -> StoreResult<Reconciliation>;

    /// Delete a reconciliation with all operations; absent ids are ignored.
    async fn remove_reconciliation(&self, scheduling_id: &SchedulingId) -> StoreResult<()>;

    /// Distinct runtime ids with at least one stored reconciliation
    async fn get_runtime_ids(&self) -> StoreResult<Vec<RuntimeId>>;

    /// Operations of a reconciliation, optionally restricted to `states`
    async fn get_operations(
        &self,
        scheduling_id: &SchedulingId,
        states: &[OperationState],
    ) -> StoreResult<Vec<Operation>>;

    async fn get_operation(
        &self,
        scheduling_id: &SchedulingId,
        correlation_id: &CorrelationId,
    ) -> StoreResult<Option<Operation>>;

    /// Operations ready for dispatch, see [`crate::find_processable_operations`]
    async fn get_processable_operations(&self, max_parallel: usize)
        -> StoreResult<Vec<Operation>>;

    /// All operations of unfinished reconciliations
    async fn get_reconciling_operations(&self) -> StoreResult<Vec<Operation>>;

    /// Move an operation from `expected` to `state`.
    ///
    /// Fails with [`StoreError::Concurrency`] when the stored state no longer
    /// equals `expected`.
    async fn compare_and_swap_operation_state(
        &self,
        scheduling_id: &SchedulingId,
        correlation_id: &CorrelationId,
        expected: OperationState,
        state: OperationState,
        reasons: &[String],
    ) -> StoreResult<Operation>;

    /// Move an operation from its currently stored state to `state`.
    async fn update_operation_state(
        &self,
        scheduling_id: &SchedulingId,
        correlation_id: &CorrelationId,
        state: OperationState,
        reasons: &[String],
    ) -> StoreResult<Operation> {
        let current = self
            .get_operation(scheduling_id, correlation_id)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "operation {correlation_id} of reconciliation {scheduling_id}"
                ))
            })?;
        self.compare_and_swap_operation_state(
            scheduling_id,
            correlation_id,
            current.state,
            state,
            reasons,
        )
        .await
    }
}
