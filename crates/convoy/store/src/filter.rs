//! Reconciliation filters
//!
//! Every filter renders itself as a SQL condition over the reconciliation
//! table and can also be evaluated against an entity in memory, so the same
//! filter value drives both repository backends.

use chrono::{DateTime, Utc};
use convoy_types::{Reconciliation, RuntimeId, SchedulingId};
use std::fmt;
use uuid::Uuid;

/// A bind parameter collected while rendering a filter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    TextArray(Vec<String>),
    Uuid(Uuid),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

/// Positional bind parameters (`$1`, `$2`, ...)
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SqlArgs {
    values: Vec<SqlValue>,
}

impl SqlArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value and return its placeholder.
    pub fn push(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

pub trait Filter: Send + Sync + fmt::Debug {
    /// SQL condition over the reconciliation table columns
    fn sql_condition(&self, args: &mut SqlArgs) -> String;

    /// Whether `reconciliation` passes the filter
    fn matches(&self, reconciliation: &Reconciliation) -> bool;
}

#[derive(Debug, Clone)]
pub struct WithSchedulingId(pub SchedulingId);

impl Filter for WithSchedulingId {
    fn sql_condition(&self, args: &mut SqlArgs) -> String {
        format!("scheduling_id = {}", args.push(SqlValue::Uuid(*self.0.as_uuid())))
    }

    fn matches(&self, reconciliation: &Reconciliation) -> bool {
        reconciliation.scheduling_id == self.0
    }
}

#[derive(Debug, Clone)]
pub struct WithRuntimeId(pub RuntimeId);

impl Filter for WithRuntimeId {
    fn sql_condition(&self, args: &mut SqlArgs) -> String {
        format!("runtime_id = {}", args.push(SqlValue::Text(self.0.to_string())))
    }

    fn matches(&self, reconciliation: &Reconciliation) -> bool {
        reconciliation.runtime_id == self.0
    }
}

#[derive(Debug, Clone)]
pub struct WithRuntimeIds(pub Vec<RuntimeId>);

impl Filter for WithRuntimeIds {
    fn sql_condition(&self, args: &mut SqlArgs) -> String {
        let ids = self.0.iter().map(ToString::to_string).collect();
        format!("runtime_id = ANY({})", args.push(SqlValue::TextArray(ids)))
    }

    fn matches(&self, reconciliation: &Reconciliation) -> bool {
        self.0.contains(&reconciliation.runtime_id)
    }
}

/// Reconciliations that are not finished yet
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentlyReconciling;

impl Filter for CurrentlyReconciling {
    fn sql_condition(&self, args: &mut SqlArgs) -> String {
        format!("finished = {}", args.push(SqlValue::Bool(false)))
    }

    fn matches(&self, reconciliation: &Reconciliation) -> bool {
        !reconciliation.finished
    }
}

#[derive(Debug, Clone)]
pub struct WithCreationDateBefore(pub DateTime<Utc>);

impl Filter for WithCreationDateBefore {
    fn sql_condition(&self, args: &mut SqlArgs) -> String {
        format!("created < {}", args.push(SqlValue::Timestamp(self.0)))
    }

    fn matches(&self, reconciliation: &Reconciliation) -> bool {
        reconciliation.created < self.0
    }
}

/// Conjunction of filters; an empty mixer matches everything
#[derive(Debug, Default)]
pub struct FilterMixer {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl Filter for FilterMixer {
    fn sql_condition(&self, args: &mut SqlArgs) -> String {
        if self.filters.is_empty() {
            return "TRUE".to_string();
        }
        self.filters
            .iter()
            .map(|filter| format!("({})", filter.sql_condition(args)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn matches(&self, reconciliation: &Reconciliation) -> bool {
        self.filters.iter().all(|filter| filter.matches(reconciliation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_types::ClusterStatus;

    fn reconciliation(runtime: &str, finished: bool) -> Reconciliation {
        let now = Utc::now();
        Reconciliation {
            scheduling_id: SchedulingId::generate(),
            runtime_id: RuntimeId::new(runtime),
            cluster_config_version: 1,
            cluster_config_status_id: 1,
            lock: if finished { String::new() } else { runtime.to_string() },
            finished,
            status: ClusterStatus::Reconciling,
            delete_strategy: String::new(),
            created: now,
            updated: now,
        }
    }

    #[test]
    fn test_filters_match_instances() {
        let running = reconciliation("rt-1", false);
        let finished = reconciliation("rt-2", true);

        assert!(CurrentlyReconciling.matches(&running));
        assert!(!CurrentlyReconciling.matches(&finished));
        assert!(WithRuntimeId(RuntimeId::new("rt-1")).matches(&running));
        assert!(WithSchedulingId(finished.scheduling_id).matches(&finished));
        assert!(WithRuntimeIds(vec![RuntimeId::new("rt-2")]).matches(&finished));
        assert!(!WithRuntimeIds(vec![]).matches(&finished));
        assert!(WithCreationDateBefore(Utc::now() + chrono::Duration::seconds(1)).matches(&running));
        assert!(!WithCreationDateBefore(running.created).matches(&running));
    }

    #[test]
    fn test_mixer_renders_conjunction() {
        let mixer = FilterMixer::new()
            .with(CurrentlyReconciling)
            .with(WithRuntimeId(RuntimeId::new("rt-1")));

        let mut args = SqlArgs::new();
        assert_eq!(
            mixer.sql_condition(&mut args),
            "(finished = $1) AND (runtime_id = $2)"
        );
        assert_eq!(
            args.into_values(),
            vec![SqlValue::Bool(false), SqlValue::Text("rt-1".to_string())]
        );

        assert!(mixer.matches(&reconciliation("rt-1", false)));
        assert!(!mixer.matches(&reconciliation("rt-1", true)));
    }

    #[test]
    fn test_empty_mixer_matches_all() {
        let mut args = SqlArgs::new();
        assert_eq!(FilterMixer::new().sql_condition(&mut args), "TRUE");
        assert!(args.is_empty());
        assert!(FilterMixer::new().matches(&reconciliation("rt-1", true)));
    }
}
