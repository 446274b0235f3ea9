use crate::{
    error::BeamError,
    models::{NewTransfer, Transfer, TransferStatus},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const FUNDING_TX_REUSED: &str = "Funding transaction already used for another transfer";

// Default name Postgres gives the UNIQUE constraint on `initial_tx_hash`.
const FUNDING_TX_CONSTRAINT: &str = "transfers_initial_tx_hash_key";
const UNIQUE_VIOLATION: &str = "23505";

/// The `transfers` table. The Transfer Creator and Claim Executor are its
/// only writers.
#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn insert(&self, transfer: NewTransfer) -> Result<Transfer, BeamError>;

    async fn find_by_claim_hash(&self, claim_hash: &str) -> Result<Option<Transfer>, BeamError>;

    async fn funding_tx_used(&self, initial_tx_hash: &str) -> Result<bool, BeamError>;

    /// Moves a `funded` record to `claimed`. Returns false when no funded
    /// record matched, so a claimed record is never overwritten.
    async fn mark_claimed(&self, claim_hash: &str, claim_tx_hash: &str) -> Result<bool, BeamError>;

    async fn ping(&self) -> bool;
}

pub struct PgTransferStore {
    pool: PgPool,
}

impl PgTransferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Transfer, BeamError> {
        let sharing_method: String = row.try_get("sharing_method")?;
        let status: String = row.try_get("status")?;

        Ok(Transfer {
            id: row.try_get("id")?,
            sender_address: row.try_get("sender_address")?,
            recipient_email: row.try_get("recipient_email")?,
            amount: row.try_get("amount")?,
            initial_tx_hash: row.try_get("initial_tx_hash")?,
            claim_hash: row.try_get("claim_hash")?,
            sharing_method: sharing_method.parse()?,
            status: status.parse()?,
            claim_tx_hash: row.try_get("claim_tx_hash")?,
            created_at: row.try_get("created_at")?,
            claimed_at: row.try_get("claimed_at")?,
        })
    }
}

#[async_trait]
impl TransferStore for PgTransferStore {
    async fn insert(&self, transfer: NewTransfer) -> Result<Transfer, BeamError> {
        let row = sqlx::query(
            "INSERT INTO transfers (sender_address, recipient_email, amount, initial_tx_hash, claim_hash, sharing_method, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(&transfer.sender_address)
        .bind(&transfer.recipient_email)
        .bind(&transfer.amount)
        .bind(&transfer.initial_tx_hash)
        .bind(&transfer.claim_hash)
        .bind(transfer.sharing_method.as_str())
        .bind(TransferStatus::Funded.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(insert_error)?;

        let created = Self::from_row(&row)?;
        tracing::info!("Recorded transfer with ID: {}", created.id);

        Ok(created)
    }

    async fn find_by_claim_hash(&self, claim_hash: &str) -> Result<Option<Transfer>, BeamError> {
        let row = sqlx::query("SELECT * FROM transfers WHERE claim_hash = $1")
            .bind(claim_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn funding_tx_used(&self, initial_tx_hash: &str) -> Result<bool, BeamError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM transfers WHERE initial_tx_hash = $1")
            .bind(initial_tx_hash)
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.try_get("count")?;
        Ok(count > 0)
    }

    async fn mark_claimed(&self, claim_hash: &str, claim_tx_hash: &str) -> Result<bool, BeamError> {
        let result = sqlx::query(
            "UPDATE transfers SET status = $1, claim_tx_hash = $2, claimed_at = $3 \
             WHERE claim_hash = $4 AND status = $5",
        )
        .bind(TransferStatus::Claimed.as_str())
        .bind(claim_tx_hash)
        .bind(Utc::now())
        .bind(claim_hash)
        .bind(TransferStatus::Funded.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// A concurrent insert that lost the race on the funding tx hash is a
/// client error, same as the pre-insert check.
fn insert_error(err: sqlx::Error) -> BeamError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
            && db_err.constraint() == Some(FUNDING_TX_CONSTRAINT)
        {
            return BeamError::Validation(FUNDING_TX_REUSED.to_string());
        }
    }
    BeamError::Database(err)
}

/// In-process store used when no database is configured.
#[derive(Default)]
pub struct MemoryTransferStore {
    transfers: RwLock<HashMap<String, Transfer>>,
}

impl MemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.transfers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transfers.read().await.is_empty()
    }
}

#[async_trait]
impl TransferStore for MemoryTransferStore {
    async fn insert(&self, transfer: NewTransfer) -> Result<Transfer, BeamError> {
        let mut transfers = self.transfers.write().await;

        if transfers.contains_key(&transfer.claim_hash) {
            return Err(BeamError::Internal(anyhow::anyhow!(
                "duplicate claim hash {}",
                transfer.claim_hash
            )));
        }
        if transfers
            .values()
            .any(|t| t.initial_tx_hash == transfer.initial_tx_hash)
        {
            return Err(BeamError::Validation(FUNDING_TX_REUSED.to_string()));
        }

        let created = Transfer {
            id: transfers.len() as i64 + 1,
            sender_address: transfer.sender_address,
            recipient_email: transfer.recipient_email,
            amount: transfer.amount,
            initial_tx_hash: transfer.initial_tx_hash,
            claim_hash: transfer.claim_hash,
            sharing_method: transfer.sharing_method,
            status: TransferStatus::Funded,
            claim_tx_hash: None,
            created_at: Utc::now(),
            claimed_at: None,
        };
        transfers.insert(created.claim_hash.clone(), created.clone());

        Ok(created)
    }

    async fn find_by_claim_hash(&self, claim_hash: &str) -> Result<Option<Transfer>, BeamError> {
        Ok(self.transfers.read().await.get(claim_hash).cloned())
    }

    async fn funding_tx_used(&self, initial_tx_hash: &str) -> Result<bool, BeamError> {
        Ok(self
            .transfers
            .read()
            .await
            .values()
            .any(|t| t.initial_tx_hash == initial_tx_hash))
    }

    async fn mark_claimed(&self, claim_hash: &str, claim_tx_hash: &str) -> Result<bool, BeamError> {
        let mut transfers = self.transfers.write().await;

        match transfers.get_mut(claim_hash) {
            Some(t) if t.status == TransferStatus::Funded => {
                t.status = TransferStatus::Claimed;
                t.claim_tx_hash = Some(claim_tx_hash.to_string());
                t.claimed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SharingMethod;

    fn new_transfer(claim_hash: &str, tx: &str) -> NewTransfer {
        NewTransfer {
            sender_address: "0x1111111111111111111111111111111111111111".to_string(),
            recipient_email: "alice@example.com".to_string(),
            amount: "12.5".to_string(),
            initial_tx_hash: tx.to_string(),
            claim_hash: claim_hash.to_string(),
            sharing_method: SharingMethod::Email,
        }
    }

    #[tokio::test]
    async fn inserted_transfer_starts_funded() {
        let store = MemoryTransferStore::new();
        let created = store.insert(new_transfer("c1", "0xaa")).await.unwrap();

        assert_eq!(created.status, TransferStatus::Funded);
        assert!(created.claim_tx_hash.is_none());
        assert!(store.funding_tx_used("0xaa").await.unwrap());
        assert!(!store.funding_tx_used("0xbb").await.unwrap());
    }

    #[tokio::test]
    async fn mark_claimed_transitions_once() {
        let store = MemoryTransferStore::new();
        store.insert(new_transfer("c1", "0xaa")).await.unwrap();

        assert!(store.mark_claimed("c1", "0xfeed").await.unwrap());
        assert!(!store.mark_claimed("c1", "0xbeef").await.unwrap());

        let t = store.find_by_claim_hash("c1").await.unwrap().unwrap();
        assert_eq!(t.status, TransferStatus::Claimed);
        assert_eq!(t.claim_tx_hash.as_deref(), Some("0xfeed"));
        assert!(t.claimed_at.is_some());
    }

    #[tokio::test]
    async fn mark_claimed_unknown_hash_is_noop() {
        let store = MemoryTransferStore::new();
        assert!(!store.mark_claimed("missing", "0xfeed").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn rejects_reused_funding_tx() {
        let store = MemoryTransferStore::new();
        store.insert(new_transfer("c1", "0xaa")).await.unwrap();

        match store.insert(new_transfer("c2", "0xaa")).await {
            Err(BeamError::Validation(msg)) => assert_eq!(msg, FUNDING_TX_REUSED),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn other_insert_failures_stay_database_errors() {
        assert!(matches!(
            insert_error(sqlx::Error::RowNotFound),
            BeamError::Database(_)
        ));
    }
}
