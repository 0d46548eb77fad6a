//! Reconciliation entity: one run for one cluster configuration

use crate::{ClusterStatus, RuntimeId, SchedulingId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub scheduling_id: SchedulingId,
    pub runtime_id: RuntimeId,
    pub cluster_config_version: i64,
    pub cluster_config_status_id: i64,
    /// Non-empty while the run is in flight
    pub lock: String,
    pub finished: bool,
    pub status: ClusterStatus,
    /// Strategy the cleanup component of a deletion runs with
    #[serde(default)]
    pub delete_strategy: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Reconciliation {
    pub fn is_locked(&self) -> bool {
        !self.lock.is_empty()
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reconciliation [scheduling_id={}, runtime_id={}, config_version={}, status={}, finished={}]",
            self.scheduling_id, self.runtime_id, self.cluster_config_version, self.status, self.finished
        )
    }
}
