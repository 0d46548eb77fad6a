use thiserror::Error;

/// Errors raised while parsing or validating core types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("unknown cluster status `{0}`")]
    UnknownClusterStatus(String),

    #[error("unknown operation state `{0}`")]
    UnknownOperationState(String),

    #[error("unknown operation type `{0}`")]
    UnknownOperationType(String),

    #[error("invalid identifier `{0}`")]
    InvalidId(String),
}
