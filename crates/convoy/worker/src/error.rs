use convoy_inventory::InventoryError;
use convoy_invoker::InvokeError;
use convoy_store::StoreError;
use convoy_types::{CorrelationId, RuntimeId};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid worker pool configuration: {0}")]
    InvalidConfig(String),

    #[error("operation {0} not found")]
    OperationNotFound(CorrelationId),

    #[error("component '{component}' is not part of the configuration of cluster {runtime_id}")]
    ComponentNotFound {
        component: String,
        runtime_id: RuntimeId,
    },

    #[error("no cluster state available for cluster {0}")]
    UnknownCluster(RuntimeId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("worker pool cancelled")]
    Cancelled,
}
