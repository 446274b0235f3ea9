use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeamError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Transfer already claimed")]
    AlreadyClaimed,

    #[error("{0}")]
    InvalidState(String),

    #[error("Claim already in progress")]
    ClaimInProgress,

    #[error("Funding transaction could not be verified: {0}")]
    FundingUnverified(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Chain error: {0}")]
    Chain(String),

    /// A payout may have been broadcast but its outcome is unknown.
    #[error("Payout not confirmed: {0}")]
    PayoutUnconfirmed(String),

    #[error("{0}")]
    Config(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BeamError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BeamError::Validation(_)
            | BeamError::AlreadyClaimed
            | BeamError::InvalidState(_)
            | BeamError::ClaimInProgress
            | BeamError::FundingUnverified(_) => StatusCode::BAD_REQUEST,
            BeamError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BeamError::Validation(_) => "VALIDATION_ERROR",
            BeamError::NotFound(_) => "NOT_FOUND",
            BeamError::AlreadyClaimed => "ALREADY_CLAIMED",
            BeamError::InvalidState(_) => "INVALID_STATE",
            BeamError::ClaimInProgress => "CLAIM_IN_PROGRESS",
            BeamError::FundingUnverified(_) => "FUNDING_UNVERIFIED",
            BeamError::Database(_) => "DATABASE_ERROR",
            BeamError::Chain(_) => "UPSTREAM_ERROR",
            BeamError::PayoutUnconfirmed(_) => "PAYOUT_UNCONFIRMED",
            BeamError::Config(_) => "CONFIG_ERROR",
            BeamError::Email(_) => "EMAIL_ERROR",
            BeamError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    pub error_code: String,
}

impl IntoResponse for BeamError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        if status.is_server_error() {
            tracing::error!(error = ?self, error_code = error_code, "Request failed");
        } else {
            tracing::debug!(error = %self, error_code = error_code, "Request rejected");
        }

        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
            error_code: error_code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
