//! Bookkeeping of running reconciliations

use crate::{ClusterStatusTransition, ReconciliationResult, SchedulerError, SchedulerResult};
use chrono::{DateTime, Utc};
use convoy_store::{CurrentlyReconciling, ReconciliationRepository, StoreError};
use convoy_types::{OperationState, Reconciliation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookkeeperConfig {
    pub interval_secs: u64,

    /// Idle time after which a running operation counts as orphaned
    pub orphan_timeout_secs: u64,
}

impl Default for BookkeeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            orphan_timeout_secs: 600,
        }
    }
}

/// Outcome of one bookkeeping pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookkeepingSummary {
    pub finished: usize,
    pub orphaned: usize,
}

pub struct Bookkeeper {
    transition: Arc<ClusterStatusTransition>,
    repo: Arc<dyn ReconciliationRepository>,
    config: BookkeeperConfig,
}

impl Bookkeeper {
    pub fn new(transition: Arc<ClusterStatusTransition>, config: BookkeeperConfig) -> Self {
        Self {
            repo: transition.repository().clone(),
            transition,
            config,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            orphan_timeout_secs = self.config.orphan_timeout_secs,
            "Bookkeeper started"
        );
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Bookkeeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once(Utc::now()).await {
                        Ok(summary) if summary != BookkeepingSummary::default() => {
                            tracing::debug!(
                                finished = summary.finished,
                                orphaned = summary.orphaned,
                                "Bookkeeping pass done"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Bookkeeping pass failed"),
                    }
                }
            }
        }
    }

    /// Evaluate every unfinished reconciliation once.
    pub async fn run_once(&self, now: DateTime<Utc>) -> SchedulerResult<BookkeepingSummary> {
        let mut summary = BookkeepingSummary::default();
        for reconciliation in self.repo.get_reconciliations(&CurrentlyReconciling).await? {
            if let Err(e) = self.book(&reconciliation, now, &mut summary).await {
                tracing::error!(
                    scheduling_id = %reconciliation.scheduling_id,
                    runtime_id = %reconciliation.runtime_id,
                    error = %e,
                    "Failed to book reconciliation"
                );
            }
        }
        Ok(summary)
    }

    async fn book(
        &self,
        reconciliation: &Reconciliation,
        now: DateTime<Utc>,
        summary: &mut BookkeepingSummary,
    ) -> SchedulerResult<()> {
        let scheduling_id = &reconciliation.scheduling_id;
        let mut result = ReconciliationResult::new(
            *scheduling_id,
            Duration::from_secs(self.config.orphan_timeout_secs),
        );
        result.add_operations(self.repo.get_operations(scheduling_id, &[]).await?)?;

        let verdict = result.verdict();
        if verdict.is_final() {
            match self
                .transition
                .finish_reconciliation(scheduling_id, verdict)
                .await
            {
                Ok(_) => summary.finished += 1,
                Err(SchedulerError::AlreadyFinished(_)) => {}
                Err(e) => return Err(e),
            }
            return Ok(());
        }

        for operation in result.orphans(now) {
            let reason = format!(
                "no update received since {}",
                operation.updated.to_rfc3339()
            );
            match self
                .repo
                .compare_and_swap_operation_state(
                    scheduling_id,
                    &operation.correlation_id,
                    operation.state,
                    OperationState::Orphan,
                    &[reason],
                )
                .await
            {
                Ok(_) => {
                    summary.orphaned += 1;
                    tracing::warn!(
                        scheduling_id = %scheduling_id,
                        correlation_id = %operation.correlation_id,
                        component = %operation.component,
                        "Operation marked as orphan"
                    );
                }
                // updated in the meantime, the next pass re-evaluates it
                Err(StoreError::Concurrency(_)) | Err(StoreError::FinalState { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
