//! Status reports of remote component reconcilers

use super::reconciliations::parse_scheduling_id;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use convoy_invoker::CallbackMessage;
use convoy_types::{CorrelationId, Operation};

/// Apply a reconciler's progress report to its operation
pub async fn operation_callback(
    State(state): State<AppState>,
    Path((scheduling_id, correlation_id)): Path<(String, String)>,
    Json(msg): Json<CallbackMessage>,
) -> ApiResult<Json<Operation>> {
    let scheduling_id = parse_scheduling_id(&scheduling_id)?;
    let correlation_id: CorrelationId = correlation_id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid correlation id: {e}")))?;

    let Some((op_state, reasons)) = msg.operation_update() else {
        tracing::debug!(
            scheduling_id = %scheduling_id,
            correlation_id = %correlation_id,
            status = %msg.status,
            "Status not propagated to operation"
        );
        let operation = state
            .repo
            .get_operation(&scheduling_id, &correlation_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("operation {correlation_id}")))?;
        return Ok(Json(operation));
    };

    let operation = state
        .repo
        .update_operation_state(&scheduling_id, &correlation_id, op_state, &reasons)
        .await?;
    tracing::debug!(
        scheduling_id = %scheduling_id,
        correlation_id = %correlation_id,
        component = %operation.component,
        state = %operation.state,
        "Callback applied"
    );
    Ok(Json(operation))
}
