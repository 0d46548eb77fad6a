use convoy_store::StoreError;
use convoy_types::{CorrelationId, SchedulingId};
use thiserror::Error;

/// Result type for invocations
pub type InvokeResult<T> = Result<T, InvokeError>;

/// Errors raised while invoking a component reconciler
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("no reconciler registered for component '{component}' and no fallback reconciler defined")]
    NoFallbackReconciler { component: String },

    #[error("operation {correlation_id} of reconciliation {scheduling_id} not found")]
    NotFound {
        scheduling_id: SchedulingId,
        correlation_id: CorrelationId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to reach component reconciler: {0}")]
    Transport(String),

    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("component reconciler failed: {0}")]
    Reconciler(String),

    #[error("invocation cancelled")]
    Cancelled,
}

impl InvokeError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            InvokeError::Transport(_) | InvokeError::Reconciler(_) => true,
            InvokeError::Store(err) => err.is_concurrency(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for InvokeError {
    fn from(err: reqwest::Error) -> Self {
        InvokeError::Transport(err.to_string())
    }
}
