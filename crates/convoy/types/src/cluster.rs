//! Cluster state as delivered by the inventory

use crate::{ClusterStatus, RuntimeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cluster identity and access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub runtime_id: RuntimeId,
    pub version: i64,
    #[serde(default)]
    pub kubeconfig: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Desired configuration of a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfiguration {
    pub runtime_id: RuntimeId,
    pub version: i64,
    pub cluster_version: i64,
    pub kyma_version: String,
    #[serde(default)]
    pub kyma_profile: String,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl ClusterConfiguration {
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Latest status entry of a cluster configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatusRecord {
    pub id: i64,
    pub runtime_id: RuntimeId,
    pub cluster_version: i64,
    pub config_version: i64,
    pub status: ClusterStatus,
    pub created: DateTime<Utc>,
}

/// Everything needed to reconcile one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    pub cluster: ClusterInfo,
    pub configuration: ClusterConfiguration,
    pub status: ClusterStatusRecord,
}

impl ClusterState {
    pub fn runtime_id(&self) -> &RuntimeId {
        &self.cluster.runtime_id
    }
}

/// A component to install on a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Source repository; empty for components from the default source
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub configuration: Vec<ConfigEntry>,
}

impl Component {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            url: String::new(),
            version: String::new(),
            configuration: Vec::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.configuration.push(ConfigEntry {
            key: key.into(),
            value,
            secret: false,
        });
        self
    }

    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.configuration
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    /// Flattened configuration as sent to component reconcilers.
    pub fn configuration_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.configuration
            .iter()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub secret: bool,
}
