use crate::{
    contracts::{IERC20, TRANSFER_EVENT_TOPIC},
    error::BeamError,
    models::format_usdc_amount,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, TransactionReceipt, H256, U256},
};
use std::str::FromStr;
use std::sync::Arc;

/// On-chain side of the sponsor wallet.
#[async_trait]
pub trait SponsorChain: Send + Sync {
    fn sponsor_address(&self) -> Address;

    /// Checks that `tx_hash` moved at least `min_amount` USDC from `sender`
    /// into the sponsor wallet.
    async fn verify_funding(
        &self,
        tx_hash: H256,
        sender: Address,
        min_amount: U256,
    ) -> Result<(), BeamError>;

    /// Broadcasts a USDC transfer from the sponsor wallet and returns its hash
    /// without waiting for inclusion.
    async fn send_usdc(&self, recipient: Address, amount: U256) -> Result<H256, BeamError>;

    /// Waits for the receipt of a broadcast payout. An `Err` means the outcome
    /// is unknown; the transfer may still land.
    async fn confirm_payout(&self, tx_hash: H256) -> Result<PayoutStatus, BeamError>;

    async fn usdc_balance(&self, account: Address) -> Result<U256, BeamError>;

    async fn block_number(&self) -> Result<u64, BeamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutStatus {
    Confirmed,
    Reverted,
}

type SponsorSigner = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct EvmSponsorChain {
    provider: Arc<Provider<Http>>,
    signer: Option<Arc<SponsorSigner>>,
    usdc_address: Address,
    sponsor_address: Address,
}

impl EvmSponsorChain {
    pub fn new(
        rpc_url: &str,
        chain_id: u64,
        usdc_address: Address,
        sponsor_address: Address,
        private_key: Option<&str>,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;

        let signer = match private_key {
            Some(key) => {
                let wallet = key
                    .parse::<LocalWallet>()
                    .context("Invalid sponsor private key")?
                    .with_chain_id(chain_id);

                if wallet.address() != sponsor_address {
                    bail!(
                        "Sponsor private key controls {:?}, expected {:?}",
                        wallet.address(),
                        sponsor_address
                    );
                }

                Some(Arc::new(SignerMiddleware::new(provider.clone(), wallet)))
            }
            None => None,
        };

        tracing::info!(
            "Sponsor chain initialized (sponsor: {:?}, signing: {})",
            sponsor_address,
            signer.is_some()
        );

        Ok(Self {
            provider: Arc::new(provider),
            signer,
            usdc_address,
            sponsor_address,
        })
    }
}

#[async_trait]
impl SponsorChain for EvmSponsorChain {
    fn sponsor_address(&self) -> Address {
        self.sponsor_address
    }

    async fn verify_funding(
        &self,
        tx_hash: H256,
        sender: Address,
        min_amount: U256,
    ) -> Result<(), BeamError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| BeamError::Chain(format!("RPC error: {}", e)))?
            .ok_or_else(|| BeamError::FundingUnverified("Transaction not found".to_string()))?;

        check_funding_receipt(
            &receipt,
            self.usdc_address,
            self.sponsor_address,
            sender,
            min_amount,
        )
        .map_err(BeamError::FundingUnverified)?;

        tracing::info!(
            "Funding verified: {} USDC from {:?} (tx: {:?})",
            format_usdc_amount(min_amount),
            sender,
            tx_hash
        );

        Ok(())
    }

    async fn send_usdc(&self, recipient: Address, amount: U256) -> Result<H256, BeamError> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            BeamError::Config("Sponsor wallet private key not configured".to_string())
        })?;

        let usdc = IERC20::new(self.usdc_address, signer.clone());

        let balance = usdc
            .balance_of(self.sponsor_address)
            .call()
            .await
            .map_err(|e| BeamError::Chain(format!("Failed to read sponsor balance: {}", e)))?;

        if balance < amount {
            return Err(BeamError::Chain(format!(
                "Insufficient sponsor USDC balance: {} < {}",
                format_usdc_amount(balance),
                format_usdc_amount(amount)
            )));
        }

        tracing::info!(
            "Sending {} USDC from sponsor to {:?}",
            format_usdc_amount(amount),
            recipient
        );

        let call = usdc.transfer(recipient, amount);
        let pending_tx = call
            .send()
            .await
            .map_err(|e| BeamError::Chain(format!("Failed to send USDC transfer: {}", e)))?;

        let sent_hash = *pending_tx;
        tracing::info!("Transaction {:?} sent, waiting for confirmation...", sent_hash);

        Ok(sent_hash)
    }

    async fn confirm_payout(&self, tx_hash: H256) -> Result<PayoutStatus, BeamError> {
        let receipt = PendingTransaction::new(tx_hash, self.provider.as_ref())
            .await
            .map_err(|e| BeamError::Chain(format!("Failed to get transaction receipt: {}", e)))?
            .ok_or_else(|| BeamError::Chain(format!("Transaction {:?} dropped", tx_hash)))?;

        if receipt.status != Some(1.into()) {
            tracing::warn!("Payout {:?} reverted", tx_hash);
            return Ok(PayoutStatus::Reverted);
        }

        tracing::info!("Payout confirmed: {:?}", receipt.transaction_hash);

        Ok(PayoutStatus::Confirmed)
    }

    async fn usdc_balance(&self, account: Address) -> Result<U256, BeamError> {
        let usdc = IERC20::new(self.usdc_address, self.provider.clone());
        usdc.balance_of(account)
            .call()
            .await
            .map_err(|e| BeamError::Chain(format!("Failed to read USDC balance: {}", e)))
    }

    async fn block_number(&self) -> Result<u64, BeamError> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| BeamError::Chain(format!("RPC error: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsdcTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

/// USDC `Transfer` events emitted by the token contract in this receipt.
pub fn usdc_transfers(receipt: &TransactionReceipt, usdc_address: Address) -> Vec<UsdcTransfer> {
    let Ok(transfer_topic) = H256::from_str(TRANSFER_EVENT_TOPIC) else {
        return Vec::new();
    };

    receipt
        .logs
        .iter()
        .filter(|log| log.address == usdc_address)
        .filter(|log| log.topics.first() == Some(&transfer_topic) && log.topics.len() >= 3)
        .map(|log| UsdcTransfer {
            from: Address::from(log.topics[1]),
            to: Address::from(log.topics[2]),
            amount: U256::from_big_endian(&log.data),
        })
        .collect()
}

/// Returns the rejection reason when the receipt does not prove funding.
pub fn check_funding_receipt(
    receipt: &TransactionReceipt,
    usdc_address: Address,
    sponsor: Address,
    sender: Address,
    min_amount: U256,
) -> Result<(), String> {
    if receipt.status != Some(1.into()) {
        return Err("Transaction failed".to_string());
    }

    let transfers = usdc_transfers(receipt, usdc_address);
    if transfers.is_empty() {
        return Err("No USDC transfer found in transaction".to_string());
    }

    let Some(transfer) = transfers.iter().find(|t| t.to == sponsor && t.from == sender) else {
        return Err(format!(
            "No USDC transfer from {:?} to sponsor wallet {:?}",
            sender, sponsor
        ));
    };

    if transfer.amount < min_amount {
        return Err(format!(
            "Insufficient funding: {} < {}",
            format_usdc_amount(transfer.amount),
            format_usdc_amount(min_amount)
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn transfer_log(token: Address, from: Address, to: Address, amount: u64) -> Log {
        let mut data = [0u8; 32];
        U256::from(amount).to_big_endian(&mut data);
        Log {
            address: token,
            topics: vec![
                H256::from_str(TRANSFER_EVENT_TOPIC).unwrap(),
                H256::from(from),
                H256::from(to),
            ],
            data: data.to_vec().into(),
            ..Default::default()
        }
    }

    fn receipt(status: u64, logs: Vec<Log>) -> TransactionReceipt {
        TransactionReceipt {
            status: Some(status.into()),
            logs,
            ..Default::default()
        }
    }

    #[test]
    fn accepts_sufficient_transfer_to_sponsor() {
        let (usdc, sponsor, sender) = (addr(1), addr(2), addr(3));
        let r = receipt(1, vec![transfer_log(usdc, sender, sponsor, 10_000_000)]);

        assert!(check_funding_receipt(&r, usdc, sponsor, sender, U256::from(10_000_000u64)).is_ok());
    }

    #[test]
    fn rejects_failed_or_short_or_misdirected_funding() {
        let (usdc, sponsor, sender) = (addr(1), addr(2), addr(3));
        let need = U256::from(10_000_000u64);

        let failed = receipt(0, vec![transfer_log(usdc, sender, sponsor, 10_000_000)]);
        assert_eq!(
            check_funding_receipt(&failed, usdc, sponsor, sender, need).unwrap_err(),
            "Transaction failed"
        );

        let short = receipt(1, vec![transfer_log(usdc, sender, sponsor, 9_999_999)]);
        assert!(check_funding_receipt(&short, usdc, sponsor, sender, need)
            .unwrap_err()
            .starts_with("Insufficient funding"));

        let elsewhere = receipt(1, vec![transfer_log(usdc, sender, addr(9), 10_000_000)]);
        assert!(check_funding_receipt(&elsewhere, usdc, sponsor, sender, need).is_err());
    }

    #[test]
    fn ignores_transfer_events_from_other_tokens() {
        let (usdc, sponsor, sender) = (addr(1), addr(2), addr(3));
        let r = receipt(1, vec![transfer_log(addr(7), sender, sponsor, 10_000_000)]);

        assert!(usdc_transfers(&r, usdc).is_empty());
        assert_eq!(
            check_funding_receipt(&r, usdc, sponsor, sender, U256::one()).unwrap_err(),
            "No USDC transfer found in transaction"
        );
    }
}
