//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health and status
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::daemon_status))
        // Clusters
        .route("/clusters", post(handlers::create_or_update_cluster))
        .route("/clusters/:runtime_id", delete(handlers::delete_cluster))
        .route("/clusters/:runtime_id/status", get(handlers::get_cluster_status))
        // Reconciliations
        .route("/reconciliations", get(handlers::list_reconciliations))
        .route(
            "/reconciliations/:scheduling_id/operations",
            get(handlers::list_operations),
        );

    // Component reconcilers report to the path carried in their task
    let callback_routes = Router::new().route(
        "/operations/:scheduling_id/callback/:correlation_id",
        post(handlers::operation_callback),
    );

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .nest("/v1", callback_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use convoy_inventory::{InMemoryInventory, Inventory};
    use convoy_store::{InMemoryReconciliationRepository, ReconciliationRepository};
    use convoy_types::{
        ClusterState, ClusterStatus, Operation, OperationState, Reconciliation, RuntimeId,
        SequenceConfig,
    };
    use serde::de::DeserializeOwned;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        inventory: Arc<InMemoryInventory>,
        repo: Arc<InMemoryReconciliationRepository>,
    }

    fn test_app() -> TestApp {
        let inventory = Arc::new(InMemoryInventory::new());
        let repo = Arc::new(InMemoryReconciliationRepository::new());
        let router = create_router(AppState::new(inventory.clone(), repo.clone()), true);
        TestApp {
            router,
            inventory,
            repo,
        }
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        router.clone().oneshot(request).await.unwrap()
    }

    async fn json<T: DeserializeOwned>(resp: Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn registration(runtime: &str) -> serde_json::Value {
        serde_json::json!({
            "runtime_id": runtime,
            "kubeconfig": "kubeconfig",
            "kyma_version": "2.0.0",
            "components": [
                {"name": "istio", "namespace": "istio-system"},
                {"name": "serverless", "namespace": "kyma-system"}
            ]
        })
    }

    /// Register a cluster and start a reconciliation for it
    async fn running(app: &TestApp, runtime: &str) -> Reconciliation {
        let resp = send(&app.router, "POST", "/api/v1/clusters", Some(registration(runtime))).await;
        let state: ClusterState = json(resp).await;
        app.repo
            .create_reconciliation(&state, &SequenceConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn health_returns_version() {
        let app = test_app();
        let resp = send(&app.router, "GET", "/api/v1/health", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn register_and_delete_cluster() {
        let app = test_app();

        let resp = send(&app.router, "POST", "/api/v1/clusters", Some(registration("rt-1"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let state: ClusterState = json(resp).await;
        assert_eq!(state.status.status, ClusterStatus::ReconcilePending);
        assert_eq!(state.configuration.components.len(), 2);

        let resp = send(&app.router, "DELETE", "/api/v1/clusters/rt-1", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let state: ClusterState = json(resp).await;
        assert_eq!(state.status.status, ClusterStatus::DeletePending);

        let stored = app.inventory.get_latest(&RuntimeId::new("rt-1")).await.unwrap();
        assert_eq!(stored.status.status, ClusterStatus::DeletePending);

        let resp = send(&app.router, "GET", "/api/v1/clusters/rt-1/status", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_cluster_is_not_found() {
        let app = test_app();
        let resp = send(&app.router, "DELETE", "/api/v1/clusters/missing", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = json(resp).await;
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn registration_requires_version() {
        let app = test_app();
        let mut body = registration("rt-1");
        body["kyma_version"] = serde_json::json!("");
        let resp = send(&app.router, "POST", "/api/v1/clusters", Some(body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_reconciliations_and_operations() {
        let app = test_app();
        let first = running(&app, "rt-1").await;
        running(&app, "rt-2").await;

        let resp = send(&app.router, "GET", "/api/v1/reconciliations", None).await;
        let all: Vec<Reconciliation> = json(resp).await;
        assert_eq!(all.len(), 2);

        let resp = send(
            &app.router,
            "GET",
            "/api/v1/reconciliations?runtime_id=rt-1&running=true",
            None,
        )
        .await;
        let filtered: Vec<Reconciliation> = json(resp).await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].scheduling_id, first.scheduling_id);

        let uri = format!("/api/v1/reconciliations/{}/operations", first.scheduling_id);
        let resp = send(&app.router, "GET", &uri, None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let operations: Vec<Operation> = json(resp).await;
        // CRDs plus both components
        assert_eq!(operations.len(), 3);

        let resp = send(&app.router, "GET", "/api/v1/reconciliations/not-a-uuid/operations", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let uri = format!(
            "/api/v1/reconciliations/{}/operations",
            convoy_types::SchedulingId::generate()
        );
        let resp = send(&app.router, "GET", &uri, None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&app.router, "GET", "/api/v1/status", None).await;
        let status: serde_json::Value = json(resp).await;
        assert_eq!(status["stats"]["running_reconciliations"], 2);
        assert_eq!(status["stats"]["reconciling_operations"], 6);
    }

    #[tokio::test]
    async fn callback_updates_operation_state() {
        let app = test_app();
        let reconciliation = running(&app, "rt-1").await;
        let operation = app
            .repo
            .get_operations(&reconciliation.scheduling_id, &[])
            .await
            .unwrap()
            .remove(0);
        let uri = format!(
            "/v1/operations/{}/callback/{}",
            operation.scheduling_id, operation.correlation_id
        );

        let resp = send(&app.router, "POST", &uri, Some(serde_json::json!({"status": "running"}))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let updated: Operation = json(resp).await;
        assert_eq!(updated.state, OperationState::InProgress);

        let resp = send(
            &app.router,
            "POST",
            &uri,
            Some(serde_json::json!({"status": "failed", "error": "chart broken"})),
        )
        .await;
        let updated: Operation = json(resp).await;
        assert_eq!(updated.state, OperationState::Error);
        assert_eq!(updated.reason, "chart broken");

        // final states reject further reports
        let resp = send(&app.router, "POST", &uri, Some(serde_json::json!({"status": "success"}))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn callback_for_unknown_operation() {
        let app = test_app();
        let reconciliation = running(&app, "rt-1").await;
        let uri = format!(
            "/v1/operations/{}/callback/{}",
            reconciliation.scheduling_id,
            convoy_types::CorrelationId::generate()
        );
        let resp = send(&app.router, "POST", &uri, Some(serde_json::json!({"status": "success"}))).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
