use crate::{handlers::*, services::TransferService};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

#[derive(Clone)]
pub struct AppState {
    pub transfers: Arc<TransferService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(transfers: Arc<TransferService>) -> Self {
        Self {
            transfers,
            started_at: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/create-transfer", post(create_transfer))
        .route("/api/execute-claim", post(execute_claim))
        .route("/api/transfers/:claim_hash", get(get_transfer))
        .route("/api/sponsor/balance", get(sponsor_balance))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
