//! Bounded worker pool

use crate::{ClusterStateRetriever, WorkerError, WorkerPoolConfig, WorkerResult, WorkerSettings};
use convoy_invoker::{retry, Invoker, Params};
use convoy_store::ReconciliationRepository;
use convoy_types::{
    ClusterStatus, CorrelationId, Operation, OperationState, OperationType, SequenceConfig,
};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Dispatches processable operations to at most `pool_size` concurrent workers
pub struct WorkerPool {
    worker: Worker,
    settings: Arc<WorkerSettings>,
    semaphore: Arc<Semaphore>,
    /// Operations currently handled by a worker of this pool
    in_flight: Arc<DashMap<CorrelationId, ()>>,
}

/// State shared by all worker tasks
#[derive(Clone)]
struct Worker {
    retriever: Arc<dyn ClusterStateRetriever>,
    repo: Arc<dyn ReconciliationRepository>,
    invoker: Arc<dyn Invoker>,
    settings: Arc<WorkerSettings>,
}

impl WorkerPool {
    pub fn new(
        retriever: Arc<dyn ClusterStateRetriever>,
        repo: Arc<dyn ReconciliationRepository>,
        invoker: Arc<dyn Invoker>,
        config: &WorkerPoolConfig,
    ) -> WorkerResult<Self> {
        let settings = Arc::new(config.validate()?);
        Ok(Self {
            worker: Worker {
                retriever,
                repo,
                invoker,
                settings: settings.clone(),
            },
            semaphore: Arc::new(Semaphore::new(settings.pool_size)),
            settings,
            in_flight: Arc::new(DashMap::new()),
        })
    }

    /// Number of workers currently running
    pub fn running_workers(&self) -> usize {
        self.settings.pool_size - self.semaphore.available_permits()
    }

    /// Dispatch until a round finds nothing to do while no worker runs.
    pub async fn run_once(&self, cancel: &CancellationToken) -> WorkerResult<()> {
        tracing::debug!(
            pool_size = self.settings.pool_size,
            "Worker pool processing until all operations are settled"
        );
        let mut ticker = interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.drain().await;
                    return Err(WorkerError::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            // sampled before querying so a worker finishing mid-round is not missed
            let busy = self.running_workers();
            let dispatched = self.dispatch_round(cancel).await?;
            if dispatched == 0 && busy == 0 {
                tracing::debug!("No processable operations left, worker pool done");
                return Ok(());
            }
        }
    }

    /// Dispatch on every check interval until `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) -> WorkerResult<()> {
        tracing::info!(
            pool_size = self.settings.pool_size,
            check_interval_ms = self.settings.check_interval.as_millis() as u64,
            max_parallel_operations = self.settings.max_parallel_operations,
            "Worker pool started"
        );
        let mut ticker = interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker pool shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.dispatch_round(cancel).await {
                        tracing::error!(error = %e, "Dispatch round failed");
                    }
                }
            }
        }

        self.drain().await;
        Ok(())
    }

    /// One dispatch round; returns the number of newly started workers.
    async fn dispatch_round(&self, cancel: &CancellationToken) -> WorkerResult<usize> {
        let operations = self
            .worker
            .repo
            .get_processable_operations(self.settings.max_parallel_operations)
            .await?;

        let mut dispatched = 0;
        for operation in operations {
            if self.in_flight.contains_key(&operation.correlation_id) {
                continue;
            }
            // `failed` is awaiting for the tier scan but final for dispatch
            if !operation.state.is_processable() {
                tracing::debug!(
                    correlation_id = %operation.correlation_id,
                    state = %operation.state,
                    "Skipping final operation"
                );
                continue;
            }

            let permit = match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::debug!("All workers busy, postponing remaining operations");
                    break;
                }
            };

            self.in_flight.insert(operation.correlation_id, ());
            let worker = self.worker.clone();
            let in_flight = self.in_flight.clone();
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let correlation_id = operation.correlation_id;
                let scheduling_id = operation.scheduling_id;
                if let Err(e) = worker.process(&cancel, operation).await {
                    tracing::error!(
                        scheduling_id = %scheduling_id,
                        correlation_id = %correlation_id,
                        error = %e,
                        "Failed to process operation"
                    );
                }
                in_flight.remove(&correlation_id);
            });
            dispatched += 1;
        }

        if dispatched > 0 {
            tracing::debug!(dispatched, running = self.running_workers(), "Dispatched operations");
        }
        Ok(dispatched)
    }

    /// Wait for all running workers to finish.
    async fn drain(&self) {
        let permits = u32::try_from(self.settings.pool_size).unwrap_or(u32::MAX);
        let _ = self.semaphore.acquire_many(permits).await;
    }
}

impl Worker {
    async fn process(&self, cancel: &CancellationToken, operation: Operation) -> WorkerResult<()> {
        let current = self
            .repo
            .get_operation(&operation.scheduling_id, &operation.correlation_id)
            .await?
            .ok_or(WorkerError::OperationNotFound(operation.correlation_id))?;

        if !current.state.is_processable() {
            tracing::warn!(
                scheduling_id = %current.scheduling_id,
                correlation_id = %current.correlation_id,
                state = %current.state,
                "Operation is no longer processable, dropping it"
            );
            return Ok(());
        }

        let state = self.retriever.cluster_state(&current).await?;
        let cfg = match current.kind {
            // the cleanup component runs with the strategy it was scheduled with
            OperationType::Delete => SequenceConfig {
                pre_components: Vec::new(),
                delete_strategy: self
                    .repo
                    .get_reconciliation(&current.scheduling_id)
                    .await?
                    .delete_strategy,
                reconciliation_status: ClusterStatus::Deleting,
            },
            OperationType::Reconcile => SequenceConfig {
                reconciliation_status: ClusterStatus::Reconciling,
                ..SequenceConfig::default()
            },
        };
        let sequence = state.configuration.reconciliation_sequence(&cfg);
        let component = sequence
            .component(&current.component)
            .cloned()
            .ok_or_else(|| WorkerError::ComponentNotFound {
                component: current.component.clone(),
                runtime_id: current.runtime_id.clone(),
            })?;

        let components_ready = self
            .repo
            .get_operations(&current.scheduling_id, &[OperationState::Done])
            .await?
            .into_iter()
            .map(|op| op.component)
            .collect();

        let params = Params {
            component,
            components_ready,
            cluster_state: state,
            scheduling_id: current.scheduling_id,
            correlation_id: current.correlation_id,
            kind: current.kind,
            max_operation_retries: self.settings.max_operation_retries,
        };

        let invoker = &self.invoker;
        let params = &params;
        retry(
            self.settings.invoker_max_retries,
            self.settings.invoker_retry_delay,
            cancel,
            |attempt| async move {
                tracing::debug!(
                    correlation_id = %params.correlation_id,
                    component = %params.component.name,
                    attempt,
                    "Invoking component reconciler"
                );
                invoker.invoke(cancel, params).await
            },
        )
        .await?;
        Ok(())
    }
}
