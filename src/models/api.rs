use super::transfer::{SharingMethod, Transfer, TransferStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The UI sends amounts either as a JSON string or a bare number.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    pub fn as_decimal_string(&self) -> String {
        match self {
            AmountInput::Text(s) => s.trim().trim_start_matches('$').to_string(),
            AmountInput::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateTransferRequest {
    pub sender_address: Option<String>,
    pub recipient_email: Option<String>,
    pub amount: Option<AmountInput>,
    pub tx_hash: Option<String>,
    pub sharing_method: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransferResponse {
    pub success: bool,
    pub claim_hash: String,
    pub claim_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecuteClaimRequest {
    pub claim_hash: Option<String>,
    pub recipient_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteClaimResponse {
    pub success: bool,
    pub tx_hash: String,
}

/// What the claim page is allowed to see about a transfer.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferView {
    pub amount: String,
    pub recipient_email: String,
    pub sender_address: String,
    pub sharing_method: SharingMethod,
    pub status: TransferStatus,
    pub claim_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl From<Transfer> for TransferView {
    fn from(t: Transfer) -> Self {
        Self {
            amount: t.amount,
            recipient_email: t.recipient_email,
            sender_address: t.sender_address,
            sharing_method: t.sharing_method,
            status: t.status,
            claim_tx_hash: t.claim_tx_hash,
            created_at: t.created_at,
            claimed_at: t.claimed_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SponsorBalance {
    pub address: String,
    pub balance: String,
    pub balance_units: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: bool,
    pub rpc: bool,
    pub block_number: Option<u64>,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}
