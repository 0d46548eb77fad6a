//! In-memory reconciliation repository.
//!
//! One mutex guards all state so that every call behaves like a database
//! transaction within a single process. Suitable for local runs and tests.

use crate::filter::Filter;
use crate::model::{check_transition, join_reasons, new_reconciliation};
use crate::processable::find_processable_operations;
use crate::traits::ReconciliationRepository;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use convoy_types::{
    ClusterState, ClusterStatus, CorrelationId, Operation, OperationState, Reconciliation,
    RuntimeId, SchedulingId, SequenceConfig,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    reconciliations: HashMap<SchedulingId, Reconciliation>,
    /// Operations per reconciliation in creation order
    operations: HashMap<SchedulingId, Vec<Operation>>,
}

impl Inner {
    fn unfinished_operations(&self) -> Vec<Operation> {
        self.reconciliations
            .values()
            .filter(|r| !r.finished)
            .filter_map(|r| self.operations.get(&r.scheduling_id))
            .flatten()
            .cloned()
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryReconciliationRepository {
    inner: Mutex<Inner>,
}

impl InMemoryReconciliationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("reconciliation repository lock poisoned".to_string()))
    }
}

#[async_trait]
impl ReconciliationRepository for InMemoryReconciliationRepository {
    async fn create_reconciliation(
        &self,
        state: &ClusterState,
        cfg: &SequenceConfig,
    ) -> StoreResult<Reconciliation> {
        let mut inner = self.lock()?;

        let duplicate = inner
            .reconciliations
            .values()
            .any(|r| !r.finished && &r.runtime_id == state.runtime_id());
        if duplicate {
            return Err(StoreError::DuplicateReconciliation(
                state.runtime_id().clone(),
            ));
        }

        let (reconciliation, operations) = new_reconciliation(state, cfg)?;
        inner
            .operations
            .insert(reconciliation.scheduling_id, operations);
        inner
            .reconciliations
            .insert(reconciliation.scheduling_id, reconciliation.clone());

        Ok(reconciliation)
    }

    async fn get_reconciliation(
        &self,
        scheduling_id: &SchedulingId,
    ) -> StoreResult<Reconciliation> {
        let inner = self.lock()?;
        inner
            .reconciliations
            .get(scheduling_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("reconciliation {scheduling_id}")))
    }

    async fn get_reconciliations(&self, filter: &dyn Filter) -> StoreResult<Vec<Reconciliation>> {
        let inner = self.lock()?;
        let mut matching: Vec<Reconciliation> = inner
            .reconciliations
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by_key(|r| (r.created, r.scheduling_id));
        Ok(matching)
    }

    async fn finish_reconciliation(
        &self,
        scheduling_id: &SchedulingId,
        status: ClusterStatus,
    ) -> StoreResult<Reconciliation> {
        let mut inner = self.lock()?;
        let reconciliation = inner
            .reconciliations
            .get_mut(scheduling_id)
            .ok_or_else(|| StoreError::NotFound(format!("reconciliation {scheduling_id}")))?;

        if reconciliation.finished {
            return Err(StoreError::AlreadyFinished(*scheduling_id));
        }
        reconciliation.finished = true;
        reconciliation.lock.clear();
        reconciliation.status = status;
        reconciliation.updated = Utc::now();

        Ok(reconciliation.clone())
    }

    async fn remove_reconciliation(&self, scheduling_id: &SchedulingId) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.operations.remove(scheduling_id);
        inner.reconciliations.remove(scheduling_id);
        Ok(())
    }

    async fn get_runtime_ids(&self) -> StoreResult<Vec<RuntimeId>> {
        let inner = self.lock()?;
        let ids: BTreeSet<RuntimeId> = inner
            .reconciliations
            .values()
            .map(|r| r.runtime_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn get_operations(
        &self,
        scheduling_id: &SchedulingId,
        states: &[OperationState],
    ) -> StoreResult<Vec<Operation>> {
        let inner = self.lock()?;
        Ok(inner
            .operations
            .get(scheduling_id)
            .map(|ops| {
                ops.iter()
                    .filter(|op| states.is_empty() || states.contains(&op.state))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_operation(
        &self,
        scheduling_id: &SchedulingId,
        correlation_id: &CorrelationId,
    ) -> StoreResult<Option<Operation>> {
        let inner = self.lock()?;
        Ok(inner
            .operations
            .get(scheduling_id)
            .and_then(|ops| ops.iter().find(|op| &op.correlation_id == correlation_id))
            .cloned())
    }

    async fn get_processable_operations(
        &self,
        max_parallel: usize,
    ) -> StoreResult<Vec<Operation>> {
        let operations = self.lock()?.unfinished_operations();
        Ok(find_processable_operations(operations, max_parallel))
    }

    async fn get_reconciling_operations(&self) -> StoreResult<Vec<Operation>> {
        Ok(self.lock()?.unfinished_operations())
    }

    async fn compare_and_swap_operation_state(
        &self,
        scheduling_id: &SchedulingId,
        correlation_id: &CorrelationId,
        expected: OperationState,
        state: OperationState,
        reasons: &[String],
    ) -> StoreResult<Operation> {
        let reason = join_reasons(reasons);
        let mut inner = self.lock()?;
        let op = inner
            .operations
            .get_mut(scheduling_id)
            .and_then(|ops| ops.iter_mut().find(|op| &op.correlation_id == correlation_id))
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "operation {correlation_id} of reconciliation {scheduling_id}"
                ))
            })?;

        check_transition(correlation_id, op.state, state, &reason)?;
        if op.state != expected {
            return Err(StoreError::Concurrency(format!(
                "operation {correlation_id} is in state {} but {expected} was expected",
                op.state
            )));
        }

        op.state = state;
        op.reason = reason;
        op.updated = Utc::now();
        Ok(op.clone())
    }
}
