use crate::{
    error::BeamError,
    models::{
        is_valid_email, parse_usdc_amount, CreateTransferRequest, CreateTransferResponse,
        ExecuteClaimRequest, NewTransfer, SharingMethod, Transfer, TransferStatus,
    },
    services::{
        store::FUNDING_TX_REUSED, ClaimLock, EmailMessage, Mailer, PayoutStatus, SponsorChain,
        TransferStore,
    },
};
use ethers::{
    types::{Address, H256},
    utils::to_checksum,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const EMAIL_SENT: &str = "Email sent successfully";
pub const EMAIL_FAILED_WARNING: &str = "Transfer created but email notification failed to send";

/// Settings the transfer flow needs from the process configuration.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub app_url: String,
    pub verify_funding: bool,
    /// Upper bound for each payout phase (broadcast, then confirmation).
    /// Both together must stay below the claim lock TTL.
    pub payout_timeout: Duration,
}

impl TransferSettings {
    pub fn claim_link(&self, claim_hash: &str) -> String {
        format!("{}/claim/{}", self.app_url.trim_end_matches('/'), claim_hash)
    }
}

/// Validated create-transfer input.
#[derive(Debug, Clone)]
pub struct TransferDraft {
    pub sender: Address,
    pub recipient_email: String,
    pub amount: String,
    pub funding_tx: H256,
    pub sharing_method: SharingMethod,
}

impl TryFrom<CreateTransferRequest> for TransferDraft {
    type Error = BeamError;

    fn try_from(req: CreateTransferRequest) -> Result<Self, Self::Error> {
        let missing = || BeamError::Validation("Missing required fields".to_string());

        let sender = non_empty(req.sender_address).ok_or_else(missing)?;
        let recipient_email = non_empty(req.recipient_email).ok_or_else(missing)?;
        let amount = req
            .amount
            .map(|a| a.as_decimal_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(missing)?;
        let tx_hash = non_empty(req.tx_hash).ok_or_else(missing)?;

        if !is_valid_email(&recipient_email) {
            return Err(BeamError::Validation("Invalid email address".to_string()));
        }

        let sharing_method = match non_empty(req.sharing_method) {
            Some(method) => method.parse::<SharingMethod>()?,
            None => SharingMethod::default(),
        };

        parse_usdc_amount(&amount)?;

        Ok(Self {
            sender: parse_address(&sender, "sender address")?,
            recipient_email,
            amount,
            funding_tx: parse_tx_hash(&tx_hash)?,
            sharing_method,
        })
    }
}

/// The two writers of the transfer table: creation and claim.
#[derive(Clone)]
pub struct TransferService {
    store: Arc<dyn TransferStore>,
    chain: Arc<dyn SponsorChain>,
    mailer: Arc<dyn Mailer>,
    claim_lock: Arc<ClaimLock>,
    settings: TransferSettings,
}

impl TransferService {
    pub fn new(
        store: Arc<dyn TransferStore>,
        chain: Arc<dyn SponsorChain>,
        mailer: Arc<dyn Mailer>,
        claim_lock: Arc<ClaimLock>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            store,
            chain,
            mailer,
            claim_lock,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    pub fn chain(&self) -> &Arc<dyn SponsorChain> {
        &self.chain
    }

    pub async fn create_transfer(
        &self,
        request: CreateTransferRequest,
    ) -> Result<CreateTransferResponse, BeamError> {
        let draft = TransferDraft::try_from(request)?;
        let funding_tx = format!("{:?}", draft.funding_tx);

        if self.store.funding_tx_used(&funding_tx).await? {
            return Err(BeamError::Validation(FUNDING_TX_REUSED.to_string()));
        }

        if self.settings.verify_funding {
            let min_amount = parse_usdc_amount(&draft.amount)?;
            self.chain
                .verify_funding(draft.funding_tx, draft.sender, min_amount)
                .await?;
        }

        let claim_hash = Uuid::new_v4().to_string();
        let claim_link = self.settings.claim_link(&claim_hash);

        let transfer = self
            .store
            .insert(NewTransfer {
                sender_address: to_checksum(&draft.sender, None),
                recipient_email: draft.recipient_email,
                amount: draft.amount,
                initial_tx_hash: funding_tx,
                claim_hash: claim_hash.clone(),
                sharing_method: draft.sharing_method,
            })
            .await?;

        tracing::info!(
            transfer_id = transfer.id,
            sharing_method = %transfer.sharing_method,
            "Transfer of {} USDC created",
            transfer.amount
        );

        let mut response = CreateTransferResponse {
            success: true,
            claim_hash,
            claim_link,
            notification: None,
            warning: None,
        };

        if transfer.sharing_method != SharingMethod::Email {
            response.notification = Some(format!(
                "Transfer created for {} sharing",
                transfer.sharing_method
            ));
            return Ok(response);
        }

        let message = EmailMessage::claim_notification(
            &transfer.recipient_email,
            &transfer.amount,
            &response.claim_link,
        );

        match self.mailer.send(&message).await {
            Ok(message_id) => {
                tracing::info!("Claim email sent ({})", message_id);
                response.notification = Some(EMAIL_SENT.to_string());
            }
            Err(e) => {
                tracing::warn!(transfer_id = transfer.id, "Failed to send email: {}", e);
                response.warning = Some(EMAIL_FAILED_WARNING.to_string());
            }
        }

        Ok(response)
    }

    pub async fn find_transfer(&self, claim_hash: &str) -> Result<Transfer, BeamError> {
        self.store
            .find_by_claim_hash(claim_hash)
            .await?
            .ok_or_else(|| BeamError::NotFound("Transfer not found".to_string()))
    }

    /// Pays out a funded transfer and returns the payout transaction hash.
    pub async fn execute_claim(&self, request: ExecuteClaimRequest) -> Result<H256, BeamError> {
        let (claim_hash, recipient) =
            match (non_empty(request.claim_hash), non_empty(request.recipient_address)) {
                (Some(hash), Some(addr)) => (hash, addr),
                _ => return Err(BeamError::Validation("Missing required fields".to_string())),
            };
        let recipient = parse_address(&recipient, "recipient address")?;

        let Some(lease) = self.claim_lock.try_acquire(&claim_hash).await else {
            tracing::warn!(claim_hash = %claim_hash, "Concurrent claim rejected");
            return Err(BeamError::ClaimInProgress);
        };

        // Detached so a dropped request cannot stop between payout and update.
        let service = self.clone();
        let task = tokio::spawn(async move {
            let result = service.claim_locked(&claim_hash, recipient).await;
            match &result {
                Err(BeamError::PayoutUnconfirmed(_)) => tracing::warn!(
                    claim_hash = %claim_hash,
                    "Payout outcome unknown, claim lock held until it expires"
                ),
                _ => service.claim_lock.release(lease).await,
            }
            result
        });

        task.await
            .map_err(|e| BeamError::Internal(anyhow::anyhow!("Claim task failed: {}", e)))?
    }

    async fn claim_locked(&self, claim_hash: &str, recipient: Address) -> Result<H256, BeamError> {
        let transfer = self.find_transfer(claim_hash).await?;

        match transfer.status {
            TransferStatus::Claimed => return Err(BeamError::AlreadyClaimed),
            TransferStatus::Funded => {}
        }

        let amount = transfer.amount_units()?;
        let limit = self.settings.payout_timeout;

        let tx_hash = tokio::time::timeout(limit, self.chain.send_usdc(recipient, amount))
            .await
            .map_err(|_| {
                tracing::error!(
                    claim_hash = %claim_hash,
                    "Payout broadcast did not finish within {:?}, manual reconciliation required",
                    limit
                );
                BeamError::PayoutUnconfirmed(format!("broadcast timed out after {:?}", limit))
            })??;
        let tx_hash_hex = format!("{:?}", tx_hash);

        // Once broadcast, only a reverted receipt leaves the transfer funded.
        match tokio::time::timeout(limit, self.chain.confirm_payout(tx_hash)).await {
            Ok(Ok(PayoutStatus::Confirmed)) => {
                self.record_claim(&transfer, recipient, &tx_hash_hex).await;
                Ok(tx_hash)
            }
            Ok(Ok(PayoutStatus::Reverted)) => Err(BeamError::Chain(format!(
                "Transaction {} failed onchain",
                tx_hash_hex
            ))),
            Ok(Err(e)) => {
                self.record_claim(&transfer, recipient, &tx_hash_hex).await;
                Err(BeamError::PayoutUnconfirmed(format!("{} ({})", tx_hash_hex, e)))
            }
            Err(_) => {
                self.record_claim(&transfer, recipient, &tx_hash_hex).await;
                Err(BeamError::PayoutUnconfirmed(format!(
                    "{} still pending after {:?}",
                    tx_hash_hex, limit
                )))
            }
        }
    }

    async fn record_claim(&self, transfer: &Transfer, recipient: Address, tx_hash_hex: &str) {
        match self.store.mark_claimed(&transfer.claim_hash, tx_hash_hex).await {
            Ok(true) => {
                tracing::info!(
                    transfer_id = transfer.id,
                    "Transfer claimed by {:?} in {}",
                    recipient,
                    tx_hash_hex
                );
            }
            Ok(false) => {
                tracing::error!(
                    claim_hash = %transfer.claim_hash,
                    tx_hash = %tx_hash_hex,
                    "Payout sent but transfer was no longer funded, manual reconciliation required"
                );
            }
            Err(e) => {
                tracing::error!(
                    claim_hash = %transfer.claim_hash,
                    tx_hash = %tx_hash_hex,
                    error = %e,
                    "Payout sent but status update failed, manual reconciliation required"
                );
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_address(value: &str, what: &str) -> Result<Address, BeamError> {
    Address::from_str(value).map_err(|_| BeamError::Validation(format!("Invalid {}", what)))
}

fn parse_tx_hash(value: &str) -> Result<H256, BeamError> {
    let hex = value.strip_prefix("0x").unwrap_or(value);
    if hex.len() != 64 {
        return Err(BeamError::Validation("Invalid transaction hash".to_string()));
    }
    H256::from_str(hex).map_err(|_| BeamError::Validation("Invalid transaction hash".to_string()))
}
