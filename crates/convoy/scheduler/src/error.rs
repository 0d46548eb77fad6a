use convoy_inventory::InventoryError;
use convoy_store::StoreError;
use convoy_types::{ClusterStatus, RuntimeId, SchedulingId};
use convoy_worker::WorkerError;
use thiserror::Error;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cluster {0} already has a reconciliation in progress")]
    AlreadyReconciling(RuntimeId),

    #[error("cluster {runtime_id} in status {status} can neither be reconciled nor deleted")]
    NotEligible {
        runtime_id: RuntimeId,
        status: ClusterStatus,
    },

    #[error("reconciliation {0} is already finished")]
    AlreadyFinished(SchedulingId),

    #[error("operation of reconciliation {found} cannot be added to result of reconciliation {expected}")]
    ForeignOperation {
        expected: SchedulingId,
        found: SchedulingId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}
