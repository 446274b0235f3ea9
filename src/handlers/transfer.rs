use crate::{
    app::AppState,
    error::BeamError,
    models::{CreateTransferRequest, CreateTransferResponse, TransferView},
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};

pub async fn create_transfer(
    State(state): State<AppState>,
    payload: Result<Json<CreateTransferRequest>, JsonRejection>,
) -> Result<Json<CreateTransferResponse>, BeamError> {
    let Json(request) = payload.map_err(|e| BeamError::Validation(e.body_text()))?;
    let response = state.transfers.create_transfer(request).await?;
    Ok(Json(response))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    Path(claim_hash): Path<String>,
) -> Result<Json<TransferView>, BeamError> {
    let transfer = state.transfers.find_transfer(&claim_hash).await?;
    Ok(Json(transfer.into()))
}
