//! Cluster status state machine
//!
//! ```text
//! reconcile_pending -> reconciling -> ready | reconcile_error
//! delete_pending    -> deleting    -> deleted | delete_error
//! ```

use crate::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Externally visible status of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    /// Waiting to be picked up by the scheduler
    ReconcilePending,
    /// A reconciliation is running
    Reconciling,
    /// Last reconciliation succeeded
    Ready,
    /// Last reconciliation failed
    ReconcileError,
    /// Waiting for deletion
    DeletePending,
    /// A deletion is running
    Deleting,
    /// Cluster was removed
    Deleted,
    /// Deletion failed
    DeleteError,
}

impl ClusterStatus {
    pub const ALL: [ClusterStatus; 8] = [
        ClusterStatus::ReconcilePending,
        ClusterStatus::Reconciling,
        ClusterStatus::Ready,
        ClusterStatus::ReconcileError,
        ClusterStatus::DeletePending,
        ClusterStatus::Deleting,
        ClusterStatus::Deleted,
        ClusterStatus::DeleteError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::ReconcilePending => "reconcile_pending",
            ClusterStatus::Reconciling => "reconciling",
            ClusterStatus::Ready => "ready",
            ClusterStatus::ReconcileError => "reconcile_error",
            ClusterStatus::DeletePending => "delete_pending",
            ClusterStatus::Deleting => "deleting",
            ClusterStatus::Deleted => "deleted",
            ClusterStatus::DeleteError => "delete_error",
        }
    }

    /// A verdict that ends a reconciliation
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ClusterStatus::Ready
                | ClusterStatus::ReconcileError
                | ClusterStatus::Deleted
                | ClusterStatus::DeleteError
        )
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, ClusterStatus::Reconciling | ClusterStatus::Deleting)
    }

    pub fn is_deletion(&self) -> bool {
        matches!(
            self,
            ClusterStatus::DeletePending
                | ClusterStatus::Deleting
                | ClusterStatus::Deleted
                | ClusterStatus::DeleteError
        )
    }

    pub fn is_reconcile_eligible(&self) -> bool {
        matches!(
            self,
            ClusterStatus::ReconcilePending | ClusterStatus::Ready | ClusterStatus::ReconcileError
        )
    }

    pub fn is_delete_eligible(&self) -> bool {
        matches!(self, ClusterStatus::DeletePending | ClusterStatus::DeleteError)
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TypeError::UnknownClusterStatus(s.to_string()))
    }
}
