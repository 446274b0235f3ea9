use crate::{app::AppState, models::HealthStatus};
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;

/// 503 when the store is unreachable so load balancers stop routing here;
/// an RPC outage alone only degrades the instance.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let store_ok = state.transfers.store().ping().await;
    let block_number = state.transfers.chain().block_number().await.ok();
    let rpc_ok = block_number.is_some();

    let (code, status) = match (store_ok, rpc_ok) {
        (true, true) => (StatusCode::OK, "healthy"),
        (true, false) => (StatusCode::OK, "degraded"),
        (false, _) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    let body = HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store_ok,
        rpc: rpc_ok,
        block_number,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    };

    (code, Json(body))
}
