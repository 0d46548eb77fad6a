//! Reconciliation inspection handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use convoy_store::{CurrentlyReconciling, FilterMixer, WithRuntimeId};
use convoy_types::{Operation, Reconciliation, RuntimeId, SchedulingId};
use serde::Deserialize;

/// Query parameters for listing reconciliations
#[derive(Debug, Default, Deserialize)]
pub struct ReconciliationQuery {
    pub runtime_id: Option<String>,
    /// Only unfinished reconciliations
    #[serde(default)]
    pub running: bool,
}

pub async fn list_reconciliations(
    State(state): State<AppState>,
    Query(query): Query<ReconciliationQuery>,
) -> ApiResult<Json<Vec<Reconciliation>>> {
    let mut filter = FilterMixer::new();
    if let Some(runtime_id) = query.runtime_id {
        filter = filter.with(WithRuntimeId(RuntimeId::new(runtime_id)));
    }
    if query.running {
        filter = filter.with(CurrentlyReconciling);
    }
    Ok(Json(state.repo.get_reconciliations(&filter).await?))
}

/// Operations of one reconciliation in creation order
pub async fn list_operations(
    State(state): State<AppState>,
    Path(scheduling_id): Path<String>,
) -> ApiResult<Json<Vec<Operation>>> {
    let scheduling_id = parse_scheduling_id(&scheduling_id)?;
    // 404 for unknown reconciliations rather than an empty list
    state.repo.get_reconciliation(&scheduling_id).await?;
    Ok(Json(state.repo.get_operations(&scheduling_id, &[]).await?))
}

pub(crate) fn parse_scheduling_id(id: &str) -> ApiResult<SchedulingId> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid scheduling id: {e}")))
}
