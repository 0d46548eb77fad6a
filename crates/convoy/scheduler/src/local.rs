//! Single-cluster reconciliation without inventory or daemon

use crate::{ReconciliationResult, SchedulerResult};
use convoy_invoker::{LocalInvoker, ReconcilerRegistry, StatusHook};
use convoy_store::{InMemoryReconciliationRepository, ReconciliationRepository};
use convoy_types::{ClusterState, ClusterStatus, Operation, SchedulingId, SequenceConfig};
use convoy_worker::{PassThroughRetriever, WorkerError, WorkerPool, WorkerPoolConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Final picture of a local run
#[derive(Debug, Clone)]
pub struct LocalRunOutcome {
    pub scheduling_id: SchedulingId,
    /// Verdict over all operations
    pub status: ClusterStatus,
    pub operations: Vec<Operation>,
    /// The run was stopped before all operations settled
    pub cancelled: bool,
}

/// Reconciles one cluster state in-process through registered reconcilers.
///
/// Operations left in a retryable state are dispatched again on every round,
/// so a run only ends early through its cancellation token.
pub struct LocalRunner {
    registry: Arc<ReconcilerRegistry>,
    worker_config: WorkerPoolConfig,
    pre_components: Vec<Vec<String>>,
    delete_strategy: String,
    status_hook: Option<StatusHook>,
}

impl LocalRunner {
    pub fn new(registry: Arc<ReconcilerRegistry>) -> Self {
        Self {
            registry,
            worker_config: WorkerPoolConfig {
                pool_size: 10,
                check_interval_ms: 100,
                invoker_retry_delay_ms: 1_000,
                ..Default::default()
            },
            pre_components: Vec::new(),
            delete_strategy: String::new(),
            status_hook: None,
        }
    }

    pub fn with_worker_config(mut self, config: WorkerPoolConfig) -> Self {
        self.worker_config = config;
        self
    }

    pub fn with_pre_components(mut self, pre_components: Vec<Vec<String>>) -> Self {
        self.pre_components = pre_components;
        self
    }

    pub fn with_delete_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.delete_strategy = strategy.into();
        self
    }

    pub fn with_status_hook(mut self, hook: StatusHook) -> Self {
        self.status_hook = Some(hook);
        self
    }

    pub async fn run(
        &self,
        cancel: &CancellationToken,
        state: ClusterState,
    ) -> SchedulerResult<LocalRunOutcome> {
        let repo = Arc::new(InMemoryReconciliationRepository::new());
        let status = if state.status.status.is_deletion() {
            ClusterStatus::Deleting
        } else {
            ClusterStatus::Reconciling
        };
        let cfg = SequenceConfig {
            pre_components: self.pre_components.clone(),
            delete_strategy: self.delete_strategy.clone(),
            reconciliation_status: status,
        };
        let reconciliation = repo.create_reconciliation(&state, &cfg).await?;
        let scheduling_id = reconciliation.scheduling_id;
        tracing::info!(
            runtime_id = %state.runtime_id(),
            scheduling_id = %scheduling_id,
            status = %status,
            "Local reconciliation started"
        );

        let mut invoker = LocalInvoker::new(repo.clone(), self.registry.clone());
        if let Some(hook) = &self.status_hook {
            invoker = invoker.with_status_hook(hook.clone());
        }
        let pool = WorkerPool::new(
            Arc::new(PassThroughRetriever::new(state)),
            repo.clone(),
            Arc::new(invoker),
            &self.worker_config,
        )?;

        let cancelled = match pool.run_once(cancel).await {
            Ok(()) => false,
            Err(WorkerError::Cancelled) => true,
            Err(e) => return Err(e.into()),
        };

        let operations = repo.get_operations(&scheduling_id, &[]).await?;
        let mut result = ReconciliationResult::new(scheduling_id, Duration::ZERO);
        result.add_operations(operations.clone())?;
        let status = result.verdict();
        if status.is_final() {
            repo.finish_reconciliation(&scheduling_id, status).await?;
        }

        tracing::info!(
            scheduling_id = %scheduling_id,
            status = %status,
            cancelled,
            "Local reconciliation finished"
        );
        Ok(LocalRunOutcome {
            scheduling_id,
            status,
            operations,
            cancelled,
        })
    }
}
