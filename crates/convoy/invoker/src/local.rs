//! In-process invocation of component reconcilers

use crate::registry::Registry;
use crate::task::{CallbackMessage, Task};
use crate::{InvokeError, InvokeResult, Invoker, Params};
use async_trait::async_trait;
use convoy_store::ReconciliationRepository;
use convoy_types::{CorrelationId, SchedulingId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Observer receiving every status report of a local reconciler
pub type StatusHook = Arc<dyn Fn(&str, &CallbackMessage) + Send + Sync>;

/// Component reconcilers addressable by component name
pub type ReconcilerRegistry = Registry<Arc<dyn ComponentReconciler>>;

/// A reconciler running inside this process
#[async_trait]
pub trait ComponentReconciler: Send + Sync {
    /// Apply `task`, reporting progress through `reporter`.
    async fn reconcile(
        &self,
        cancel: &CancellationToken,
        task: &Task,
        reporter: &CallbackReporter,
    ) -> InvokeResult<()>;
}

/// Translates reconciler status reports into operation state changes
pub struct CallbackReporter {
    repo: Arc<dyn ReconciliationRepository>,
    scheduling_id: SchedulingId,
    correlation_id: CorrelationId,
    component: String,
    status_hook: Option<StatusHook>,
}

impl CallbackReporter {
    pub async fn report(&self, msg: CallbackMessage) -> InvokeResult<()> {
        if let Some(hook) = &self.status_hook {
            hook(&self.component, &msg);
        }

        let Some((state, reasons)) = msg.operation_update() else {
            tracing::debug!(
                scheduling_id = %self.scheduling_id,
                correlation_id = %self.correlation_id,
                status = %msg.status,
                "Status not propagated to operation"
            );
            return Ok(());
        };

        tracing::debug!(
            scheduling_id = %self.scheduling_id,
            correlation_id = %self.correlation_id,
            component = %self.component,
            state = %state,
            "Updating operation state"
        );
        self.repo
            .update_operation_state(&self.scheduling_id, &self.correlation_id, state, &reasons)
            .await?;
        Ok(())
    }
}

/// Invoker calling reconcilers from a [`ReconcilerRegistry`]
pub struct LocalInvoker {
    repo: Arc<dyn ReconciliationRepository>,
    registry: Arc<ReconcilerRegistry>,
    status_hook: Option<StatusHook>,
}

impl LocalInvoker {
    pub fn new(repo: Arc<dyn ReconciliationRepository>, registry: Arc<ReconcilerRegistry>) -> Self {
        Self {
            repo,
            registry,
            status_hook: None,
        }
    }

    pub fn with_status_hook(mut self, hook: StatusHook) -> Self {
        self.status_hook = Some(hook);
        self
    }
}

#[async_trait]
impl Invoker for LocalInvoker {
    async fn invoke(&self, cancel: &CancellationToken, params: &Params) -> InvokeResult<()> {
        let reconciler = self.registry.resolve(&params.component.name)?;
        let task = params.new_task(String::new());
        let reporter = CallbackReporter {
            repo: self.repo.clone(),
            scheduling_id: params.scheduling_id,
            correlation_id: params.correlation_id,
            component: params.component.name.clone(),
            status_hook: self.status_hook.clone(),
        };

        tracing::debug!(
            scheduling_id = %params.scheduling_id,
            correlation_id = %params.correlation_id,
            component = %params.component.name,
            "Calling local reconciler"
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(InvokeError::Cancelled),
            result = reconciler.reconcile(cancel, &task, &reporter) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture, params};
    use crate::CallbackStatus;
    use convoy_types::OperationState;
    use std::sync::Mutex;

    /// Reports a fixed sequence of messages
    struct ScriptedReconciler {
        script: Vec<CallbackMessage>,
        tasks: Mutex<Vec<Task>>,
    }

    impl ScriptedReconciler {
        fn new(script: Vec<CallbackMessage>) -> Arc<Self> {
            Arc::new(Self {
                script,
                tasks: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ComponentReconciler for ScriptedReconciler {
        async fn reconcile(
            &self,
            _cancel: &CancellationToken,
            task: &Task,
            reporter: &CallbackReporter,
        ) -> InvokeResult<()> {
            self.tasks.lock().unwrap().push(task.clone());
            for msg in &self.script {
                reporter.report(msg.clone()).await?;
            }
            Ok(())
        }
    }

    fn registry(name: &str, reconciler: Arc<ScriptedReconciler>) -> Arc<ReconcilerRegistry> {
        let reconciler: Arc<dyn ComponentReconciler> = reconciler;
        Arc::new(ReconcilerRegistry::new().register(name, reconciler))
    }

    #[tokio::test]
    async fn test_success_marks_operation_done() {
        let (repo, state, op) = fixture("istio").await;
        let reconciler = ScriptedReconciler::new(vec![
            CallbackMessage::new(CallbackStatus::Running),
            CallbackMessage::new(CallbackStatus::Success),
        ]);
        let invoker = LocalInvoker::new(repo.clone(), registry("istio", reconciler.clone()));

        invoker
            .invoke(&CancellationToken::new(), &params(&state, &op))
            .await
            .unwrap();

        let stored = repo
            .get_operation(&op.scheduling_id, &op.correlation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, OperationState::Done);
        let tasks = reconciler.tasks.lock().unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].callback_url.is_empty());
    }

    #[tokio::test]
    async fn test_error_maps_to_client_error() {
        let (repo, state, op) = fixture("istio").await;
        let reconciler = ScriptedReconciler::new(vec![
            CallbackMessage::new(CallbackStatus::Running),
            CallbackMessage::with_error(CallbackStatus::Error, "helm timeout"),
        ]);
        let invoker = LocalInvoker::new(repo.clone(), registry("istio", reconciler));

        invoker
            .invoke(&CancellationToken::new(), &params(&state, &op))
            .await
            .unwrap();

        let stored = repo
            .get_operation(&op.scheduling_id, &op.correlation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, OperationState::ClientError);
        assert_eq!(stored.reason, "helm timeout");
    }

    #[tokio::test]
    async fn test_failed_maps_to_error_with_default_reason() {
        let (repo, state, op) = fixture("istio").await;
        let reconciler = ScriptedReconciler::new(vec![
            CallbackMessage::new(CallbackStatus::Running),
            CallbackMessage::new(CallbackStatus::Failed),
        ]);
        let invoker = LocalInvoker::new(repo.clone(), registry("istio", reconciler));

        invoker
            .invoke(&CancellationToken::new(), &params(&state, &op))
            .await
            .unwrap();

        let stored = repo
            .get_operation(&op.scheduling_id, &op.correlation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, OperationState::Error);
        assert_eq!(stored.reason, "component reconciler reported status 'failed'");
    }

    #[tokio::test]
    async fn test_fallback_and_status_hook() {
        let (repo, state, op) = fixture("serverless").await;
        let reconciler = ScriptedReconciler::new(vec![
            CallbackMessage::new(CallbackStatus::NotStarted),
            CallbackMessage::new(CallbackStatus::Running),
            CallbackMessage::new(CallbackStatus::Success),
        ]);
        let fallback: Arc<dyn ComponentReconciler> = reconciler.clone();
        let registry = Arc::new(
            ReconcilerRegistry::new()
                .register("base", fallback)
                .with_fallback("base"),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hook: StatusHook = Arc::new(move |component: &str, msg: &CallbackMessage| {
            sink.lock().unwrap().push((component.to_string(), msg.status));
        });

        LocalInvoker::new(repo.clone(), registry)
            .with_status_hook(hook)
            .invoke(&CancellationToken::new(), &params(&state, &op))
            .await
            .unwrap();

        assert_eq!(reconciler.tasks.lock().unwrap()[0].component, "serverless");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("serverless".to_string(), CallbackStatus::NotStarted),
                ("serverless".to_string(), CallbackStatus::Running),
                ("serverless".to_string(), CallbackStatus::Success),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_reconciler_without_fallback() {
        let (repo, state, op) = fixture("istio").await;
        let invoker = LocalInvoker::new(repo.clone(), Arc::new(ReconcilerRegistry::new()));

        let result = invoker
            .invoke(&CancellationToken::new(), &params(&state, &op))
            .await;

        assert!(matches!(result, Err(InvokeError::NoFallbackReconciler { .. })));
        let stored = repo
            .get_operation(&op.scheduling_id, &op.correlation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, OperationState::New);
    }
}
