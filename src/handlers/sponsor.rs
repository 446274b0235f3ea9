use crate::{
    app::AppState,
    error::BeamError,
    models::{format_usdc_amount, ApiResponse, SponsorBalance},
};
use axum::{extract::State, Json};
use ethers::utils::to_checksum;

pub async fn sponsor_balance(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SponsorBalance>>, BeamError> {
    let chain = state.transfers.chain();
    let address = chain.sponsor_address();
    let balance = chain.usdc_balance(address).await?;

    Ok(Json(ApiResponse::ok(SponsorBalance {
        address: to_checksum(&address, None),
        balance: format_usdc_amount(balance),
        balance_units: balance.to_string(),
    })))
}
