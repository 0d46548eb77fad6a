//! Entity construction and state-transition rules shared by both backends

use crate::{StoreError, StoreResult};
use chrono::Utc;
use convoy_types::{
    ClusterState, CorrelationId, Operation, OperationState, OperationType, Reconciliation,
    SchedulingId, SequenceConfig,
};

/// Build a reconciliation with one operation per component of `state`.
pub(crate) fn new_reconciliation(
    state: &ClusterState,
    cfg: &SequenceConfig,
) -> StoreResult<(Reconciliation, Vec<Operation>)> {
    if state.configuration.components.is_empty() {
        return Err(StoreError::EmptyComponents(state.runtime_id().clone()));
    }

    let now = Utc::now();
    let scheduling_id = SchedulingId::generate();
    let reconciliation = Reconciliation {
        scheduling_id,
        runtime_id: state.runtime_id().clone(),
        cluster_config_version: state.configuration.version,
        cluster_config_status_id: state.status.id,
        lock: state.runtime_id().to_string(),
        finished: false,
        status: cfg.reconciliation_status,
        delete_strategy: cfg.delete_strategy.clone(),
        created: now,
        updated: now,
    };

    let kind = if cfg.reconciliation_status.is_deletion() || state.status.status.is_deletion() {
        OperationType::Delete
    } else {
        OperationType::Reconcile
    };

    let operations = state
        .configuration
        .reconciliation_sequence(cfg)
        .prioritized()
        .map(|(priority, component)| Operation {
            scheduling_id,
            correlation_id: CorrelationId::generate(),
            runtime_id: state.runtime_id().clone(),
            cluster_config_version: state.configuration.version,
            component: component.name.clone(),
            priority,
            kind,
            state: OperationState::New,
            reason: String::new(),
            created: now,
            updated: now,
        })
        .collect();

    Ok((reconciliation, operations))
}

/// Join non-empty reasons with `", "`.
pub(crate) fn join_reasons(reasons: &[String]) -> String {
    reasons
        .iter()
        .map(|reason| reason.trim())
        .filter(|reason| !reason.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate moving an operation from `current` to `target` with `reason`.
pub(crate) fn check_transition(
    correlation_id: &CorrelationId,
    current: OperationState,
    target: OperationState,
    reason: &str,
) -> StoreResult<()> {
    if current.is_final() {
        return Err(StoreError::FinalState {
            correlation_id: *correlation_id,
            state: current,
        });
    }
    match (target.requires_reason(), reason.is_empty()) {
        (true, true) => Err(StoreError::InvalidReason(format!(
            "state {target} of operation {correlation_id} requires a reason"
        ))),
        (false, false) => Err(StoreError::InvalidReason(format!(
            "state {target} of operation {correlation_id} does not accept a reason"
        ))),
        _ => Ok(()),
    }
}
