use crate::{
    app::AppState,
    error::BeamError,
    models::{ExecuteClaimRequest, ExecuteClaimResponse},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

pub async fn execute_claim(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteClaimRequest>, JsonRejection>,
) -> Result<Json<ExecuteClaimResponse>, BeamError> {
    let Json(request) = payload.map_err(|e| BeamError::Validation(e.body_text()))?;
    let tx_hash = state.transfers.execute_claim(request).await?;

    Ok(Json(ExecuteClaimResponse {
        success: true,
        tx_hash: format!("{:?}", tx_hash),
    }))
}
