//! Priority sequencing of components
//!
//! A reconciliation installs its components in tiers. The CRD component always
//! forms the first tier, deletions add the cleanup component as a tier of its
//! own, then each configured pre-component group follows. Everything left runs
//! in parallel in the last tier.

use crate::{ClusterConfiguration, ClusterStatus, Component};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Artificial component installing all CRDs before anything else
pub const CRD_COMPONENT: &str = "CRDs";

/// Artificial component removing leftovers when a cluster is deleted
pub const CLEANUP_COMPONENT: &str = "cleaner";

/// Configuration key carrying the delete strategy to the cleanup component
pub const DELETE_STRATEGY_KEY: &str = "delete_strategy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Ordered groups; each group becomes its own tier
    #[serde(default)]
    pub pre_components: Vec<Vec<String>>,
    #[serde(default)]
    pub delete_strategy: String,
    /// Status the cluster is moved to by this reconciliation
    pub reconciliation_status: ClusterStatus,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            pre_components: Vec::new(),
            delete_strategy: String::new(),
            reconciliation_status: ClusterStatus::Reconciling,
        }
    }
}

/// Components grouped into ordered tiers
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationSequence {
    pub tiers: Vec<Vec<Component>>,
}

impl ReconciliationSequence {
    /// Priority of each component, starting at 1.
    pub fn prioritized(&self) -> impl Iterator<Item = (i64, &Component)> + '_ {
        self.tiers.iter().enumerate().flat_map(|(idx, tier)| {
            tier.iter().map(move |component| (idx as i64 + 1, component))
        })
    }

    /// Look up a component of any tier, including the artificial ones.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.tiers.iter().flatten().find(|component| component.name == name)
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClusterConfiguration {
    pub fn reconciliation_sequence(&self, cfg: &SequenceConfig) -> ReconciliationSequence {
        let mut tiers = vec![vec![self.crd_component()]];

        if cfg.reconciliation_status.is_deletion() {
            tiers.push(vec![Component::new(CLEANUP_COMPONENT, "default").with_config(
                DELETE_STRATEGY_KEY,
                serde_json::Value::String(cfg.delete_strategy.clone()),
            )]);
        }

        let mut assigned: HashSet<&str> = HashSet::from([CRD_COMPONENT]);
        if cfg.reconciliation_status.is_deletion() {
            assigned.insert(CLEANUP_COMPONENT);
        }

        for group in &cfg.pre_components {
            let members: Vec<&Component> = group
                .iter()
                .filter_map(|name| self.component(name))
                .filter(|component| !assigned.contains(component.name.as_str()))
                .collect();
            if members.is_empty() {
                continue;
            }
            assigned.extend(members.iter().map(|component| component.name.as_str()));
            tiers.push(members.into_iter().cloned().collect());
        }

        let remaining: Vec<Component> = self
            .components
            .iter()
            .filter(|component| !assigned.contains(component.name.as_str()))
            .cloned()
            .collect();
        if !remaining.is_empty() {
            tiers.push(remaining);
        }

        ReconciliationSequence { tiers }
    }

    /// The artificial CRD component, carrying the source and settings of a
    /// configured component of the same name.
    fn crd_component(&self) -> Component {
        let mut crds = Component::new(CRD_COMPONENT, "default");
        if let Some(configured) = self.component(CRD_COMPONENT) {
            crds.url = configured.url.clone();
            crds.version = configured.version.clone();
            crds.configuration = configured.configuration.clone();
        }
        crds
    }
}
