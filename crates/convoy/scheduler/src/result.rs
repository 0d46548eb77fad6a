//! Reduction of a reconciliation's operations into a cluster verdict

use crate::{SchedulerError, SchedulerResult};
use chrono::{DateTime, Utc};
use convoy_types::{ClusterStatus, Operation, OperationState, OperationType, SchedulingId};
use std::time::Duration;

/// Operations of one reconciliation, bucketed by progress
#[derive(Debug, Clone)]
pub struct ReconciliationResult {
    scheduling_id: SchedulingId,
    orphan_timeout: Duration,
    kind: OperationType,
    new: Vec<Operation>,
    running: Vec<Operation>,
    done: Vec<Operation>,
    error: Vec<Operation>,
}

impl ReconciliationResult {
    pub fn new(scheduling_id: SchedulingId, orphan_timeout: Duration) -> Self {
        Self {
            scheduling_id,
            orphan_timeout,
            kind: OperationType::Reconcile,
            new: Vec::new(),
            running: Vec::new(),
            done: Vec::new(),
            error: Vec::new(),
        }
    }

    pub fn add_operations(&mut self, operations: Vec<Operation>) -> SchedulerResult<()> {
        for operation in operations {
            self.add_operation(operation)?;
        }
        Ok(())
    }

    pub fn add_operation(&mut self, operation: Operation) -> SchedulerResult<()> {
        if operation.scheduling_id != self.scheduling_id {
            return Err(SchedulerError::ForeignOperation {
                expected: self.scheduling_id,
                found: operation.scheduling_id,
            });
        }

        if operation.kind == OperationType::Delete {
            self.kind = OperationType::Delete;
        }
        match operation.state {
            OperationState::New => self.new.push(operation),
            OperationState::InProgress | OperationState::ClientError | OperationState::Orphan => {
                self.running.push(operation)
            }
            OperationState::Done => self.done.push(operation),
            OperationState::Error | OperationState::Failed => self.error.push(operation),
        }
        Ok(())
    }

    /// Cluster status implied by the current operation states.
    pub fn verdict(&self) -> ClusterStatus {
        let deletion = self.kind == OperationType::Delete;
        if !self.error.is_empty() && self.running.is_empty() {
            return if deletion {
                ClusterStatus::DeleteError
            } else {
                ClusterStatus::ReconcileError
            };
        }
        if !self.running.is_empty() || !self.new.is_empty() {
            return if deletion {
                ClusterStatus::Deleting
            } else {
                ClusterStatus::Reconciling
            };
        }
        if !self.done.is_empty() {
            return if deletion {
                ClusterStatus::Deleted
            } else {
                ClusterStatus::Ready
            };
        }
        ClusterStatus::ReconcileError
    }

    /// Running operations without an update for at least the orphan timeout.
    pub fn orphans(&self, now: DateTime<Utc>) -> Vec<&Operation> {
        self.running
            .iter()
            .filter(|op| op.state != OperationState::Orphan)
            .filter(|op| {
                let idle = (now - op.updated).to_std().unwrap_or_default();
                let orphaned = idle >= self.orphan_timeout;
                tracing::trace!(
                    correlation_id = %op.correlation_id,
                    idle_secs = idle.as_secs(),
                    orphaned,
                    "Checked operation for orphan timeout"
                );
                orphaned
            })
            .collect()
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.running
            .iter()
            .chain(&self.new)
            .chain(&self.done)
            .chain(&self.error)
    }

    pub fn scheduling_id(&self) -> SchedulingId {
        self.scheduling_id
    }
}
