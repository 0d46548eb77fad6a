//! Operation entity: one component's unit of work within a reconciliation

use crate::{CorrelationId, RuntimeId, SchedulingId, TypeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    New,
    InProgress,
    Done,
    /// Reconciler gave up; blocks the tier
    Error,
    /// Request was rejected or could not be interpreted; retried
    ClientError,
    Failed,
    /// No update arrived within the orphan timeout; retried
    Orphan,
}

impl OperationState {
    pub const ALL: [OperationState; 7] = [
        OperationState::New,
        OperationState::InProgress,
        OperationState::Done,
        OperationState::Error,
        OperationState::ClientError,
        OperationState::Failed,
        OperationState::Orphan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::New => "new",
            OperationState::InProgress => "in_progress",
            OperationState::Done => "done",
            OperationState::Error => "error",
            OperationState::ClientError => "client_error",
            OperationState::Failed => "failed",
            OperationState::Orphan => "orphan",
        }
    }

    /// No transition is allowed out of a final state.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OperationState::Done | OperationState::Error | OperationState::Failed
        )
    }

    /// Whether entering this state needs a non-empty reason.
    pub fn requires_reason(&self) -> bool {
        matches!(
            self,
            OperationState::Error
                | OperationState::Failed
                | OperationState::ClientError
                | OperationState::Orphan
        )
    }

    /// Members of a tier that have not been (successfully) attempted yet.
    ///
    /// `failed` counts as awaiting rather than blocking its tier. It is final,
    /// so workers drop it on pickup; the frontier orders it after the
    /// dispatchable members so it never takes their parallelism slots.
    pub fn is_awaiting_attempt(&self) -> bool {
        matches!(
            self,
            OperationState::New
                | OperationState::ClientError
                | OperationState::Failed
                | OperationState::Orphan
        )
    }

    /// Whether a worker may pick the operation up.
    pub fn is_processable(&self) -> bool {
        !self.is_final() && *self != OperationState::InProgress
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| TypeError::UnknownOperationState(s.to_string()))
    }
}

/// What the component reconciler is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OperationType {
    #[default]
    #[serde(rename = "reconcile")]
    Reconcile,
    #[serde(rename = "delete")]
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Reconcile => "reconcile",
            OperationType::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reconcile" => Ok(OperationType::Reconcile),
            "delete" => Ok(OperationType::Delete),
            other => Err(TypeError::UnknownOperationType(other.to_string())),
        }
    }
}

/// One component to apply for one reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub scheduling_id: SchedulingId,
    pub correlation_id: CorrelationId,
    pub runtime_id: RuntimeId,
    pub cluster_config_version: i64,
    pub component: String,
    /// Tier within the reconciliation; 1 runs first
    pub priority: i64,
    pub kind: OperationType,
    pub state: OperationState,
    /// Empty unless the state requires a reason
    pub reason: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Operation [scheduling_id={}, correlation_id={}, runtime_id={}, component={}, priority={}, state={}]",
            self.scheduling_id,
            self.correlation_id,
            self.runtime_id,
            self.component,
            self.priority,
            self.state
        )
    }
}
