//! Invocation of component reconcilers running as HTTP services
//!
//! The invoker claims the operation (`in_progress`), posts the task and only
//! interprets the immediate answer. Progress arrives later through the
//! callback URL carried in the task.

use crate::registry::Registry;
use crate::task::{ErrorResponse, MissingDependenciesResponse};
use crate::{InvokeError, InvokeResult, Invoker, Params};
use async_trait::async_trait;
use convoy_store::{ReconciliationRepository, StoreError};
use convoy_types::{CorrelationId, OperationState, SchedulingId};
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Reconciler service URLs addressable by component name
pub type ReconcilerEndpoints = Registry<String>;

/// Externally reachable address of the callback endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAddress {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl Default for CallbackAddress {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

impl CallbackAddress {
    pub fn callback_url(&self, scheduling_id: &SchedulingId, correlation_id: &CorrelationId) -> String {
        format!(
            "{}://{}:{}/v1/operations/{}/callback/{}",
            self.scheme, self.host, self.port, scheduling_id, correlation_id
        )
    }
}

pub struct RemoteInvoker {
    repo: Arc<dyn ReconciliationRepository>,
    client: Client,
    endpoints: Arc<ReconcilerEndpoints>,
    callback: CallbackAddress,
    /// Operations claimed by this invoker whose task was not delivered yet
    undelivered: DashMap<CorrelationId, SchedulingId>,
}

impl RemoteInvoker {
    pub fn new(
        repo: Arc<dyn ReconciliationRepository>,
        endpoints: Arc<ReconcilerEndpoints>,
        callback: CallbackAddress,
        request_timeout: Duration,
    ) -> InvokeResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            repo,
            client,
            endpoints,
            callback,
            undelivered: DashMap::new(),
        })
    }

    /// Move the operation to `in_progress` unless someone else owns it.
    ///
    /// Returns `false` when the operation is already running elsewhere.
    async fn claim(&self, params: &Params) -> InvokeResult<bool> {
        let operation = self
            .repo
            .get_operation(&params.scheduling_id, &params.correlation_id)
            .await?
            .ok_or(InvokeError::NotFound {
                scheduling_id: params.scheduling_id,
                correlation_id: params.correlation_id,
            })?;

        if operation.state == OperationState::InProgress {
            // a failed delivery of our own is re-sent
            return Ok(self.undelivered.contains_key(&params.correlation_id));
        }
        self.undelivered.remove(&params.correlation_id);

        self.repo
            .compare_and_swap_operation_state(
                &params.scheduling_id,
                &params.correlation_id,
                operation.state,
                OperationState::InProgress,
                &[],
            )
            .await?;
        self.undelivered
            .insert(params.correlation_id, params.scheduling_id);
        Ok(true)
    }

    /// Forget undelivered tasks whose operation moved on without us.
    ///
    /// Covers deliveries that exhausted their retries and were later orphaned
    /// or finished through the callback.
    async fn prune_undelivered(&self) {
        let pending: Vec<(CorrelationId, SchedulingId)> = self
            .undelivered
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        for (correlation_id, scheduling_id) in pending {
            match self.repo.get_operation(&scheduling_id, &correlation_id).await {
                Ok(Some(op)) if op.state == OperationState::InProgress => {}
                Ok(_) => {
                    self.undelivered.remove(&correlation_id);
                }
                Err(err) => {
                    tracing::debug!(
                        correlation_id = %correlation_id,
                        error = %err,
                        "Could not check undelivered operation"
                    );
                }
            }
        }
    }

    async fn mark_client_error(&self, params: &Params, reason: String) -> InvokeResult<()> {
        tracing::warn!(
            scheduling_id = %params.scheduling_id,
            correlation_id = %params.correlation_id,
            component = %params.component.name,
            reason = %reason,
            "Component reconciler rejected task"
        );
        let result = self
            .repo
            .compare_and_swap_operation_state(
                &params.scheduling_id,
                &params.correlation_id,
                OperationState::InProgress,
                OperationState::ClientError,
                &[reason],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            // the reconciler already reported through the callback
            Err(StoreError::Concurrency(_)) | Err(StoreError::FinalState { .. }) => {
                tracing::debug!(
                    correlation_id = %params.correlation_id,
                    "Operation changed concurrently, keeping reported state"
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl Invoker for RemoteInvoker {
    async fn invoke(&self, cancel: &CancellationToken, params: &Params) -> InvokeResult<()> {
        let url = self.endpoints.resolve(&params.component.name)?;

        self.prune_undelivered().await;
        if !self.claim(params).await? {
            tracing::debug!(
                scheduling_id = %params.scheduling_id,
                correlation_id = %params.correlation_id,
                "Operation already in progress, skipping"
            );
            return Ok(());
        }

        let task = params.new_task(
            self.callback
                .callback_url(&params.scheduling_id, &params.correlation_id),
        );

        tracing::debug!(
            correlation_id = %params.correlation_id,
            component = %task.component,
            url = %url,
            "Calling remote reconciler"
        );

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                // left in progress; the bookkeeper orphans it for re-pickup
                self.undelivered.remove(&params.correlation_id);
                return Err(InvokeError::Cancelled);
            }
            response = self.client.post(&url).json(&task).send() => response?,
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => format!("<unreadable body: {err}>"),
        };
        self.undelivered.remove(&params.correlation_id);

        tracing::debug!(
            correlation_id = %params.correlation_id,
            status = %status,
            "Remote reconciler answered"
        );

        match rejection_reason(status, &body) {
            None => Ok(()),
            Some(reason) => self.mark_client_error(params, reason).await,
        }
    }
}

/// Reason for a `client_error`, or `None` when the task was accepted.
fn rejection_reason(status: StatusCode, body: &str) -> Option<String> {
    let diagnostic = || format!("reconciler responded with status {status}: {body}");

    if status.is_success() {
        return match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(_)) => None,
            _ => Some(diagnostic()),
        };
    }

    if status == StatusCode::PRECONDITION_REQUIRED {
        return Some(match serde_json::from_str::<MissingDependenciesResponse>(body) {
            Ok(resp) => format!(
                "missing dependencies: {}",
                resp.dependencies.missing.join(", ")
            ),
            Err(_) => diagnostic(),
        });
    }

    if status.is_client_error() {
        if let Ok(resp) = serde_json::from_str::<ErrorResponse>(body) {
            if !resp.error.trim().is_empty() {
                return Some(resp.error);
            }
        }
    }

    Some(diagnostic())
}
