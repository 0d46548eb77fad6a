use crate::task::{ReconcilerConfiguration, Task, TaskRepository};
use convoy_types::{ClusterState, Component, CorrelationId, OperationType, SchedulingId};

const DEFAULT_BRANCH: &str = "main";
const TOKEN_NAMESPACE_KEY: &str = "repo.token.namespace";

/// Everything an invoker needs to dispatch one operation
#[derive(Debug, Clone)]
pub struct Params {
    pub component: Component,
    /// Names of components already reconciled within the same run
    pub components_ready: Vec<String>,
    pub cluster_state: ClusterState,
    pub scheduling_id: SchedulingId,
    pub correlation_id: CorrelationId,
    pub kind: OperationType,
    pub max_operation_retries: u32,
}

impl Params {
    /// Build the task payload; `callback_url` is empty for in-process calls.
    pub fn new_task(&self, callback_url: impl Into<String>) -> Task {
        let configuration = self.component.configuration_map();
        let token_namespace = match configuration.get(TOKEN_NAMESPACE_KEY) {
            Some(serde_json::Value::String(ns)) => ns.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Task {
            components_ready: self.components_ready.clone(),
            component: self.component.name.clone(),
            namespace: self.component.namespace.clone(),
            version: self.version(),
            url: self.component.url.clone(),
            profile: self.cluster_state.configuration.kyma_profile.clone(),
            configuration,
            kubeconfig: self.cluster_state.cluster.kubeconfig.clone(),
            metadata: self.cluster_state.cluster.metadata.clone(),
            callback_url: callback_url.into(),
            correlation_id: self.correlation_id.to_string(),
            repository: TaskRepository {
                url: self.component.url.clone(),
                token_namespace,
            },
            kind: self.kind,
            component_configuration: ReconcilerConfiguration {
                max_retries: self.max_operation_retries,
                debug: false,
            },
        }
    }

    fn version(&self) -> String {
        if !self.component.version.is_empty() {
            self.component.version.clone()
        } else if self.component.url.ends_with(".git") {
            DEFAULT_BRANCH.to_string()
        } else {
            self.cluster_state.configuration.kyma_version.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use convoy_types::{
        ClusterConfiguration, ClusterInfo, ClusterStatus, ClusterStatusRecord, RuntimeId,
    };
    use serde_json::json;

    fn params(component: Component) -> Params {
        let runtime_id = RuntimeId::new("runtime-1");
        Params {
            component: component.clone(),
            components_ready: vec!["CRDs".into()],
            cluster_state: ClusterState {
                cluster: ClusterInfo {
                    runtime_id: runtime_id.clone(),
                    version: 1,
                    kubeconfig: "kubeconfig".into(),
                    metadata: json!({"region": "eu"}),
                },
                configuration: ClusterConfiguration {
                    runtime_id: runtime_id.clone(),
                    version: 1,
                    cluster_version: 1,
                    kyma_version: "2.4.0".into(),
                    kyma_profile: "production".into(),
                    components: vec![component],
                },
                status: ClusterStatusRecord {
                    id: 1,
                    runtime_id,
                    cluster_version: 1,
                    config_version: 1,
                    status: ClusterStatus::Reconciling,
                    created: Utc::now(),
                },
            },
            scheduling_id: SchedulingId::generate(),
            correlation_id: CorrelationId::generate(),
            kind: OperationType::Reconcile,
            max_operation_retries: 3,
        }
    }

    #[test]
    fn test_version_defaults_to_kyma_version() {
        let task = params(Component::new("istio", "istio-system")).new_task("");
        assert_eq!(task.version, "2.4.0");
        assert_eq!(task.profile, "production");
        assert_eq!(task.metadata, json!({"region": "eu"}));
        assert_eq!(task.component_configuration.max_retries, 3);
        assert!(task.callback_url.is_empty());
    }

    #[test]
    fn test_version_for_git_sources() {
        let mut component = Component::new("custom", "default");
        component.url = "https://github.com/acme/custom.git".into();
        assert_eq!(params(component.clone()).new_task("").version, "main");

        component.version = "v1.2.3".into();
        let task = params(component).new_task("");
        assert_eq!(task.version, "v1.2.3");
        assert_eq!(task.repository.url, "https://github.com/acme/custom.git");
    }

    #[test]
    fn test_token_namespace_from_configuration() {
        let component = Component::new("custom", "default")
            .with_config("repo.token.namespace", json!("tokens"));
        let p = params(component);
        let task = p.new_task("http://cb");
        assert_eq!(task.repository.token_namespace, "tokens");
        assert_eq!(task.callback_url, "http://cb");
        assert_eq!(task.correlation_id, p.correlation_id.to_string());
    }
}
