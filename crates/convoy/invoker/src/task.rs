//! Wire types exchanged with component reconcilers

use convoy_types::{OperationState, OperationType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Work item handed to a component reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub components_ready: Vec<String>,
    pub component: String,
    pub namespace: String,
    pub version: String,
    pub url: String,
    pub profile: String,
    pub configuration: serde_json::Map<String, serde_json::Value>,
    pub kubeconfig: String,
    pub metadata: serde_json::Value,
    #[serde(rename = "callbackURL", default, skip_serializing_if = "String::is_empty")]
    pub callback_url: String,
    #[serde(rename = "correlationID")]
    pub correlation_id: String,
    pub repository: TaskRepository,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub component_configuration: ReconcilerConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRepository {
    pub url: String,
    pub token_namespace: String,
}

/// Execution settings forwarded to the component reconciler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilerConfiguration {
    pub max_retries: u32,
    #[serde(default)]
    pub debug: bool,
}

/// Progress report of a component reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    NotStarted,
    Running,
    Failed,
    Error,
    Success,
}

impl fmt::Display for CallbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallbackStatus::NotStarted => "notstarted",
            CallbackStatus::Running => "running",
            CallbackStatus::Failed => "failed",
            CallbackStatus::Error => "error",
            CallbackStatus::Success => "success",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackMessage {
    pub status: CallbackStatus,
    #[serde(default)]
    pub error: String,
}

impl CallbackMessage {
    pub fn new(status: CallbackStatus) -> Self {
        Self {
            status,
            error: String::new(),
        }
    }

    pub fn with_error(status: CallbackStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }

    /// Operation state and reasons this report leads to.
    ///
    /// `failed` is terminal for the operation while `error` leaves it open
    /// for another attempt. `notstarted` changes nothing.
    pub fn operation_update(&self) -> Option<(OperationState, Vec<String>)> {
        let state = match self.status {
            CallbackStatus::Running => OperationState::InProgress,
            CallbackStatus::Failed => OperationState::Error,
            CallbackStatus::Success => OperationState::Done,
            CallbackStatus::Error => OperationState::ClientError,
            CallbackStatus::NotStarted => return None,
        };
        if !state.requires_reason() {
            return Some((state, Vec::new()));
        }
        let reason = if self.error.trim().is_empty() {
            format!("component reconciler reported status '{}'", self.status)
        } else {
            self.error.clone()
        };
        Some((state, vec![reason]))
    }
}

/// Body of a `428 Precondition Required` answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingDependenciesResponse {
    pub dependencies: MissingDependencies,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingDependencies {
    #[serde(default)]
    pub required: Vec<String>,
    pub missing: Vec<String>,
}

/// Body of any other failed answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_wire_names() {
        let task = Task {
            components_ready: vec!["CRDs".into()],
            component: "istio".into(),
            namespace: "istio-system".into(),
            version: "2.0.0".into(),
            url: String::new(),
            profile: "evaluation".into(),
            configuration: serde_json::Map::new(),
            kubeconfig: "kubeconfig".into(),
            metadata: json!({}),
            callback_url: "http://localhost:8080/v1/operations/a/callback/b".into(),
            correlation_id: "b".into(),
            repository: TaskRepository {
                url: String::new(),
                token_namespace: String::new(),
            },
            kind: OperationType::Delete,
            component_configuration: ReconcilerConfiguration {
                max_retries: 5,
                debug: false,
            },
        };

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["componentsReady"], json!(["CRDs"]));
        assert_eq!(value["callbackURL"], json!("http://localhost:8080/v1/operations/a/callback/b"));
        assert_eq!(value["correlationID"], json!("b"));
        assert_eq!(value["type"], json!("delete"));
        assert_eq!(value["repository"]["tokenNamespace"], json!(""));
        assert_eq!(value["componentConfiguration"]["maxRetries"], json!(5));
    }

    #[test]
    fn test_callback_message_parsing() {
        let msg: CallbackMessage =
            serde_json::from_value(json!({"status": "error", "error": "timeout"})).unwrap();
        assert_eq!(msg.status, CallbackStatus::Error);
        assert_eq!(msg.error, "timeout");

        let msg: CallbackMessage = serde_json::from_value(json!({"status": "success"})).unwrap();
        assert_eq!(msg, CallbackMessage::new(CallbackStatus::Success));
    }

    #[test]
    fn test_missing_dependencies_body() {
        let body: MissingDependenciesResponse =
            serde_json::from_value(json!({"dependencies": {"missing": ["istio", "certs"]}})).unwrap();
        assert_eq!(body.dependencies.missing, vec!["istio", "certs"]);
        assert!(body.dependencies.required.is_empty());
    }

    #[test]
    fn test_operation_update_mapping() {
        let update = |msg: CallbackMessage| msg.operation_update();

        assert_eq!(
            update(CallbackMessage::new(CallbackStatus::Running)),
            Some((OperationState::InProgress, vec![]))
        );
        assert_eq!(
            update(CallbackMessage::new(CallbackStatus::Success)),
            Some((OperationState::Done, vec![]))
        );
        assert_eq!(
            update(CallbackMessage::with_error(CallbackStatus::Error, "timeout")),
            Some((OperationState::ClientError, vec!["timeout".to_string()]))
        );
        let (state, reasons) = update(CallbackMessage::new(CallbackStatus::Failed)).unwrap();
        assert_eq!(state, OperationState::Error);
        assert_eq!(reasons, vec!["component reconciler reported status 'failed'".to_string()]);
        assert_eq!(update(CallbackMessage::new(CallbackStatus::NotStarted)), None);
    }
}
