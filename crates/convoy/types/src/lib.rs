//! Convoy core types
//!
//! Shared vocabulary for the reconciliation scheduler:
//! - identifiers for runs, operations and clusters
//! - the cluster status state machine
//! - reconciliation and operation entities
//! - cluster state as delivered by the inventory
//! - priority sequencing of components

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod cluster;
mod error;
pub mod ids;
pub mod operation;
pub mod reconciliation;
pub mod sequence;
pub mod status;

pub use cluster::{
    ClusterConfiguration, ClusterInfo, ClusterState, ClusterStatusRecord, Component, ConfigEntry,
};
pub use error::TypeError;
pub use ids::{CorrelationId, RuntimeId, SchedulingId};
pub use operation::{Operation, OperationState, OperationType};
pub use reconciliation::Reconciliation;
pub use sequence::{
    ReconciliationSequence, SequenceConfig, CLEANUP_COMPONENT, CRD_COMPONENT, DELETE_STRATEGY_KEY,
};
pub use status::ClusterStatus;
