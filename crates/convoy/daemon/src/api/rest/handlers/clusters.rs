//! Cluster registration handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use convoy_inventory::ClusterRegistration;
use convoy_types::{ClusterState, RuntimeId};

/// Register a cluster or a new configuration of it
pub async fn create_or_update_cluster(
    State(state): State<AppState>,
    Json(request): Json<ClusterRegistration>,
) -> ApiResult<Json<ClusterState>> {
    if request.runtime_id.as_str().trim().is_empty() {
        return Err(ApiError::BadRequest("runtime_id must not be empty".to_string()));
    }
    if request.kyma_version.trim().is_empty() {
        return Err(ApiError::BadRequest("kyma_version must not be empty".to_string()));
    }

    let cluster = state.inventory.create_or_update(request).await?;
    tracing::info!(
        runtime_id = %cluster.runtime_id(),
        config_version = cluster.configuration.version,
        status = %cluster.status.status,
        "Cluster registered"
    );
    Ok(Json(cluster))
}

/// Flag a cluster for deletion; the scheduler picks it up on its next check
pub async fn delete_cluster(
    State(state): State<AppState>,
    Path(runtime_id): Path<String>,
) -> ApiResult<Json<ClusterState>> {
    let cluster = state
        .inventory
        .mark_for_deletion(&RuntimeId::new(runtime_id))
        .await?;
    tracing::info!(runtime_id = %cluster.runtime_id(), "Cluster marked for deletion");
    Ok(Json(cluster))
}

/// Latest state of a cluster
pub async fn get_cluster_status(
    State(state): State<AppState>,
    Path(runtime_id): Path<String>,
) -> ApiResult<Json<ClusterState>> {
    Ok(Json(
        state.inventory.get_latest(&RuntimeId::new(runtime_id)).await?,
    ))
}
