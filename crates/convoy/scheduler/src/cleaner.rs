//! Purging of old finished reconciliations

use crate::{SchedulerError, SchedulerResult};
use chrono::{DateTime, Utc};
use convoy_store::{ReconciliationRepository, WithRuntimeId};
use convoy_types::{ClusterStatus, RuntimeId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    pub interval_secs: u64,

    /// Finished reconciliations created longer ago are removed
    pub purge_older_than_secs: u64,

    /// Successful reconciliations kept per cluster regardless of age; zero
    /// keeps all of them until they expire
    pub retain_reconciliations: usize,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            purge_older_than_secs: 14 * 24 * 3600,
            retain_reconciliations: 0,
        }
    }
}

pub struct Cleaner {
    repo: Arc<dyn ReconciliationRepository>,
    config: CleanerConfig,
}

impl Cleaner {
    pub fn new(repo: Arc<dyn ReconciliationRepository>, config: CleanerConfig) -> Self {
        Self { repo, config }
    }

    pub async fn run(&self, cancel: &CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            purge_older_than_secs = self.config.purge_older_than_secs,
            retain_reconciliations = self.config.retain_reconciliations,
            "Cleaner started"
        );
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Cleaner stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once(Utc::now()).await {
                        Ok(0) => {}
                        Ok(removed) => tracing::info!(removed, "Purged reconciliations"),
                        Err(e) => tracing::error!(error = %e, "Cleanup pass failed"),
                    }
                }
            }
        }
    }

    /// Remove purgeable reconciliations of all clusters; returns how many.
    pub async fn run_once(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let age = chrono::Duration::from_std(Duration::from_secs(self.config.purge_older_than_secs))
            .map_err(|e| SchedulerError::InvalidConfig(format!("purge_older_than_secs: {e}")))?;
        let cutoff = now - age;

        let mut removed = 0;
        for runtime_id in self.repo.get_runtime_ids().await? {
            match self.clean_runtime(&runtime_id, cutoff).await {
                Ok(count) => removed += count,
                Err(e) => tracing::error!(
                    runtime_id = %runtime_id,
                    error = %e,
                    "Failed to clean reconciliations"
                ),
            }
        }
        Ok(removed)
    }

    async fn clean_runtime(
        &self,
        runtime_id: &RuntimeId,
        cutoff: DateTime<Utc>,
    ) -> SchedulerResult<usize> {
        let reconciliations = self
            .repo
            .get_reconciliations(&WithRuntimeId(runtime_id.clone()))
            .await?;

        let retain = self.config.retain_reconciliations;
        let mut ready_seen = 0;
        let mut removed = 0;
        // newest first; the newest run of a cluster always stays
        for (idx, reconciliation) in reconciliations.iter().rev().enumerate() {
            let ready = reconciliation.status == ClusterStatus::Ready;
            if ready {
                ready_seen += 1;
            }
            if idx == 0 || !reconciliation.finished {
                continue;
            }

            let expired = reconciliation.created < cutoff;
            let surplus = retain > 0 && ready && ready_seen > retain;
            if !expired && !surplus {
                continue;
            }

            self.repo
                .remove_reconciliation(&reconciliation.scheduling_id)
                .await?;
            removed += 1;
            tracing::debug!(
                runtime_id = %runtime_id,
                scheduling_id = %reconciliation.scheduling_id,
                created = %reconciliation.created,
                expired,
                "Removed reconciliation"
            );
        }
        Ok(removed)
    }
}
