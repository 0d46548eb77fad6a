use convoy_types::{CorrelationId, OperationState, RuntimeId, SchedulingId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("reconciliation for cluster {0} is already in progress")]
    DuplicateReconciliation(RuntimeId),

    #[error("cluster {0} has no components to reconcile")]
    EmptyComponents(RuntimeId),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("reconciliation {0} is already finished")]
    AlreadyFinished(SchedulingId),

    /// The record changed between read and write; re-read before retrying.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("operation {correlation_id} is in final state {state}")]
    FinalState {
        correlation_id: CorrelationId,
        state: OperationState,
    },

    #[error("invalid reason: {0}")]
    InvalidReason(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_concurrency(&self) -> bool {
        matches!(self, StoreError::Concurrency(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
