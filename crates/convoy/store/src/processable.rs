//! Selection of operations that may be dispatched right now.
//!
//! Operations of one reconciliation are processed tier by tier (ascending
//! priority). Per reconciliation the tiers are scanned in order:
//!
//! - a tier containing an `error` operation halts the reconciliation;
//! - a tier without in-progress or not-yet-attempted members is complete and
//!   the scan moves on;
//! - a tier without in-progress members is the frontier: its not-yet-attempted
//!   members are returned, oldest first with `failed` ones last;
//! - a tier with in-progress members has to settle first, nothing is returned.
//!
//! Across reconciliations there is no ordering; each contributes at most
//! `max_parallel` operations per call when a limit is set.

use convoy_types::{Operation, OperationState, SchedulingId};
use std::collections::{BTreeMap, HashMap};

pub fn find_processable_operations(
    operations: Vec<Operation>,
    max_parallel: usize,
) -> Vec<Operation> {
    let mut by_reconciliation: HashMap<SchedulingId, BTreeMap<i64, Vec<Operation>>> =
        HashMap::new();
    for op in operations {
        by_reconciliation
            .entry(op.scheduling_id)
            .or_default()
            .entry(op.priority)
            .or_default()
            .push(op);
    }

    // oldest reconciliation first
    let mut reconciliations: Vec<_> = by_reconciliation.into_values().collect();
    reconciliations.sort_by_key(|tiers| {
        tiers
            .values()
            .flatten()
            .map(|op| (op.created, op.scheduling_id))
            .min()
    });

    reconciliations
        .into_iter()
        .flat_map(|tiers| frontier(tiers, max_parallel))
        .collect()
}

fn frontier(tiers: BTreeMap<i64, Vec<Operation>>, max_parallel: usize) -> Vec<Operation> {
    for (_, tier) in tiers {
        if tier.iter().any(|op| op.state == OperationState::Error) {
            return Vec::new();
        }

        let in_progress = tier
            .iter()
            .filter(|op| op.state == OperationState::InProgress)
            .count();
        let mut awaiting: Vec<Operation> = tier
            .into_iter()
            .filter(|op| op.state.is_awaiting_attempt())
            .collect();

        if in_progress == 0 && awaiting.is_empty() {
            continue;
        }
        if in_progress > 0 {
            return Vec::new();
        }

        awaiting.sort_by_key(|op| {
            (op.state == OperationState::Failed, op.created, op.correlation_id)
        });
        if max_parallel > 0 {
            awaiting.truncate(max_parallel);
        }
        return awaiting;
    }
    Vec::new()
}
