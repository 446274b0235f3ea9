use crate::error::BeamError;
use chrono::{DateTime, Utc};
use ethers::types::U256;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

pub const USDC_DECIMALS: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Funded,
    Claimed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Funded => "funded",
            TransferStatus::Claimed => "claimed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "funded" => Ok(TransferStatus::Funded),
            "claimed" => Ok(TransferStatus::Claimed),
            other => Err(BeamError::InvalidState(format!(
                "Transfer not yet funded (status: {})",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingMethod {
    Email,
    Whatsapp,
    Twitter,
    Copy,
}

impl SharingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharingMethod::Email => "email",
            SharingMethod::Whatsapp => "whatsapp",
            SharingMethod::Twitter => "twitter",
            SharingMethod::Copy => "copy",
        }
    }
}

impl Default for SharingMethod {
    fn default() -> Self {
        SharingMethod::Email
    }
}

impl fmt::Display for SharingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharingMethod {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(SharingMethod::Email),
            "whatsapp" => Ok(SharingMethod::Whatsapp),
            "twitter" => Ok(SharingMethod::Twitter),
            "copy" => Ok(SharingMethod::Copy),
            _ => Err(BeamError::Validation("Invalid sharing method".to_string())),
        }
    }
}

/// A persisted transfer row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    pub sender_address: String,
    pub recipient_email: String,
    pub amount: String,
    pub initial_tx_hash: String,
    pub claim_hash: String,
    pub sharing_method: SharingMethod,
    pub status: TransferStatus,
    pub claim_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Base-unit value of the stored amount.
    pub fn amount_units(&self) -> Result<U256, BeamError> {
        parse_usdc_amount(&self.amount)
    }
}

/// Insert payload. Status is always `funded` on creation.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub sender_address: String,
    pub recipient_email: String,
    pub amount: String,
    pub initial_tx_hash: String,
    pub claim_hash: String,
    pub sharing_method: SharingMethod,
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

fn amount_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)?$").unwrap())
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Converts a human-unit USDC amount ("12.5") into base units (12500000).
///
/// Rejects anything that is not a plain positive decimal or that carries
/// more precision than the token has.
pub fn parse_usdc_amount(amount: &str) -> Result<U256, BeamError> {
    let amount = amount.trim();
    if !amount_regex().is_match(amount) {
        return Err(BeamError::Validation(format!("Invalid amount: {}", amount)));
    }

    if let Some((_, fraction)) = amount.split_once('.') {
        if fraction.len() > USDC_DECIMALS as usize {
            return Err(BeamError::Validation(format!(
                "Amount {} has more than {} decimal places",
                amount, USDC_DECIMALS
            )));
        }
    }

    let units: U256 = ethers::utils::parse_units(amount, USDC_DECIMALS)
        .map_err(|e| BeamError::Validation(format!("Invalid amount {}: {}", amount, e)))?
        .into();

    if units.is_zero() {
        return Err(BeamError::Validation("Amount must be positive".to_string()));
    }

    Ok(units)
}

/// Human-unit rendering of a base-unit USDC value.
pub fn format_usdc_amount(units: U256) -> String {
    ethers::utils::format_units(units, USDC_DECIMALS).unwrap_or_else(|_| units.to_string())
}
