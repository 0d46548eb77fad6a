//! Inventory watcher feeding due clusters into the transition

use crate::{ClusterStatusTransition, SchedulerResult};
use convoy_inventory::Inventory;
use convoy_types::{ClusterState, ClusterStatus, Reconciliation, SequenceConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Inventory polling interval
    pub watch_interval_secs: u64,

    /// Age of a `ready` status after which the cluster is reconciled again;
    /// zero disables periodic re-reconciliation
    pub cluster_reconcile_interval_secs: u64,

    /// Capacity of the queue between inventory watcher and dispatcher
    pub queue_size: usize,

    /// Component groups installed before all other components
    pub pre_components: Vec<Vec<String>>,

    pub delete_strategy: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            watch_interval_secs: 60,
            cluster_reconcile_interval_secs: 900,
            queue_size: 10,
            pre_components: Vec::new(),
            delete_strategy: String::new(),
        }
    }
}

pub struct Scheduler {
    inventory: Arc<dyn Inventory>,
    transition: Arc<ClusterStatusTransition>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(transition: Arc<ClusterStatusTransition>, config: SchedulerConfig) -> Self {
        Self {
            inventory: transition.inventory().clone(),
            transition,
            config,
        }
    }

    /// Run watcher and dispatcher until `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) {
        tracing::info!(
            watch_interval_secs = self.config.watch_interval_secs,
            cluster_reconcile_interval_secs = self.config.cluster_reconcile_interval_secs,
            "Scheduler started"
        );
        let (tx, rx) = mpsc::channel(self.config.queue_size.max(1));
        tokio::join!(self.watch_inventory(cancel, tx), self.dispatch(cancel, rx));
        tracing::info!("Scheduler stopped");
    }

    async fn watch_inventory(&self, cancel: &CancellationToken, tx: mpsc::Sender<ClusterState>) {
        let mut ticker = interval(Duration::from_secs(self.config.watch_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let reconcile_interval = Duration::from_secs(self.config.cluster_reconcile_interval_secs);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let states = match self.inventory.clusters_to_reconcile(reconcile_interval).await {
                Ok(states) => states,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to fetch clusters to reconcile");
                    continue;
                }
            };
            if !states.is_empty() {
                tracing::debug!(count = states.len(), "Clusters due for reconciliation");
            }

            for state in states {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(state) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, cancel: &CancellationToken, mut rx: mpsc::Receiver<ClusterState>) {
        loop {
            let state = tokio::select! {
                _ = cancel.cancelled() => break,
                state = rx.recv() => match state {
                    Some(state) => state,
                    None => break,
                },
            };

            if let Err(e) = self.schedule(&state).await {
                tracing::warn!(
                    runtime_id = %state.runtime_id(),
                    error = %e,
                    "Failed to start reconciliation"
                );
            }
        }
    }

    /// Start a reconciliation for one cluster state.
    pub async fn schedule(&self, state: &ClusterState) -> SchedulerResult<Reconciliation> {
        let cfg = SequenceConfig {
            pre_components: self.config.pre_components.clone(),
            delete_strategy: self.config.delete_strategy.clone(),
            // replaced by the transition's target status
            reconciliation_status: ClusterStatus::Reconciling,
        };
        self.transition
            .start_reconciliation(state.runtime_id(), state.configuration.version, &cfg)
            .await
    }
}
