//! Payment contract client for the Base chain
//!
//! Verifies deposit transactions against the airtime payment contract and
//! submits treasury-signed refunds. Receipt waits are bounded polls; an
//! expired budget is reported as `NotYetConfirmed`, which is retryable and
//! distinct from a failed verification.

use alloy::{
    network::EthereumWallet,
    primitives::{Address, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolEvent,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ChainConfig;

/// USDC uses 6 decimals on Base
const USDC_DECIMALS: u32 = 6;

// Payment contract interface. Deposits emit OrderPaid with the order_ref
// correlation key; refunds are sent by the treasury signer.
sol! {
    #[sol(rpc)]
    interface IAirtimePayments {
        function refund(string calldata orderRef, address receiver, uint256 amount) external;

        event OrderPaid(string orderRef, address payer, uint256 amount);

        event Refunded(string orderRef, address receiver, uint256 amount);
    }
}

#[derive(Debug)]
pub enum ChainError {
    /// Receipt not found or not confirmed within the wait budget; the
    /// order is untouched and the caller may retry
    NotYetConfirmed(String),
    /// Receipt exists but does not prove a valid deposit for this order
    VerificationFailed(String),
    /// Refund signing credential not configured
    SignerUnavailable,
    /// Refund submission or confirmation failed
    TransactionError(String),
    ProviderError(String),
    InvalidConfig(String),
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::NotYetConfirmed(msg) => write!(f, "Not yet confirmed: {}", msg),
            ChainError::VerificationFailed(msg) => write!(f, "Verification failed: {}", msg),
            ChainError::SignerUnavailable => write!(f, "Treasury signer not configured"),
            ChainError::TransactionError(msg) => write!(f, "Transaction error: {}", msg),
            ChainError::ProviderError(msg) => write!(f, "Provider error: {}", msg),
            ChainError::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

/// Facts extracted from a verified deposit receipt.
#[derive(Debug, Clone)]
pub struct DepositVerification {
    pub payer: String,
    pub amount_usdc: Decimal,
    pub block_number: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Verify that `tx_hash` is a confirmed, successful transaction to the
    /// payment contract whose logs carry an OrderPaid event for
    /// `order_ref` covering at least `min_amount_usdc`.
    async fn verify_deposit(
        &self,
        tx_hash: &str,
        order_ref: &str,
        min_amount_usdc: Decimal,
    ) -> Result<DepositVerification, ChainError>;

    /// Submit a treasury refund and wait for its confirmation. Returns the
    /// refund transaction hash.
    async fn send_refund(
        &self,
        order_ref: &str,
        receiver: &str,
        amount_usdc: Decimal,
    ) -> Result<String, ChainError>;

    /// Whether a treasury signing credential is configured.
    fn can_refund(&self) -> bool;
}

pub struct PaymentChainService {
    provider: RootProvider<Http<Client>>,
    rpc_url: String,
    contract_address: Address,
    treasury: Option<EthereumWallet>,
    confirmations: u64,
    receipt_timeout: Duration,
    receipt_poll: Duration,
}

impl PaymentChainService {
    /// Connects to the RPC node and verifies the chain id.
    pub async fn new(config: &ChainConfig) -> Result<Self, ChainError> {
        info!(
            rpc_url = %config.rpc_url,
            contract = %config.payment_contract_address,
            "Initializing PaymentChainService"
        );

        let provider = ProviderBuilder::new().on_http(
            config
                .rpc_url
                .parse()
                .map_err(|e| ChainError::InvalidConfig(format!("Invalid RPC URL: {}", e)))?,
        );

        let chain_id = provider.get_chain_id().await.map_err(|e| {
            error!(error = %e, "Failed to connect to chain RPC");
            ChainError::ProviderError(format!("Connection failed: {}", e))
        })?;

        if chain_id != config.chain_id {
            warn!(
                expected = config.chain_id,
                actual = chain_id,
                "Chain ID mismatch"
            );
        }

        let contract_address = Address::from_str(&config.payment_contract_address)
            .map_err(|e| ChainError::InvalidConfig(format!("Invalid contract address: {}", e)))?;

        let treasury = match &config.treasury_private_key {
            Some(key) => {
                let signer: PrivateKeySigner = key.parse().map_err(|e| {
                    ChainError::InvalidConfig(format!("Invalid treasury key: {}", e))
                })?;
                Some(EthereumWallet::from(signer))
            }
            None => {
                warn!("No treasury key configured; refunds will require manual action");
                None
            }
        };

        info!(
            chain_id = chain_id,
            contract = %contract_address,
            refunds_enabled = treasury.is_some(),
            "PaymentChainService initialized"
        );

        Ok(Self {
            provider,
            rpc_url: config.rpc_url.clone(),
            contract_address,
            treasury,
            confirmations: config.confirmations.max(1),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            receipt_poll: Duration::from_millis(config.receipt_poll_ms),
        })
    }

    /// Find and decode the OrderPaid event for `order_ref` in receipt logs.
    fn match_order_paid(
        &self,
        logs: &[alloy::rpc::types::Log],
        order_ref: &str,
    ) -> Option<IAirtimePayments::OrderPaid> {
        let signature = IAirtimePayments::OrderPaid::SIGNATURE_HASH;

        for log in logs {
            if log.address() != self.contract_address {
                continue;
            }
            match log.topics().first() {
                Some(topic0) if *topic0 == signature => {}
                _ => continue,
            }
            match IAirtimePayments::OrderPaid::decode_log_data(&log.inner.data, true) {
                Ok(event) if event.orderRef == order_ref => return Some(event),
                Ok(event) => {
                    debug!(
                        found = %event.orderRef,
                        wanted = %order_ref,
                        "OrderPaid event for a different order in receipt"
                    );
                }
                Err(e) => {
                    debug!(error = %e, "Undecodable OrderPaid-shaped log");
                }
            }
        }
        None
    }
}

#[async_trait]
impl ChainClient for PaymentChainService {
    async fn verify_deposit(
        &self,
        tx_hash: &str,
        order_ref: &str,
        min_amount_usdc: Decimal,
    ) -> Result<DepositVerification, ChainError> {
        let hash = B256::from_str(tx_hash)
            .map_err(|e| ChainError::VerificationFailed(format!("Invalid tx hash: {}", e)))?;

        let start = std::time::Instant::now();

        let receipt = loop {
            if start.elapsed() >= self.receipt_timeout {
                return Err(ChainError::NotYetConfirmed(format!(
                    "no confirmed receipt for {} within {}s",
                    tx_hash,
                    self.receipt_timeout.as_secs()
                )));
            }

            let maybe_receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| ChainError::ProviderError(format!("Receipt query failed: {}", e)))?;

            if let Some(receipt) = maybe_receipt {
                let mined_at = receipt.block_number.unwrap_or(0);
                let current_block = self.provider.get_block_number().await.map_err(|e| {
                    ChainError::ProviderError(format!("Block number query failed: {}", e))
                })?;

                if current_block.saturating_sub(mined_at) + 1 >= self.confirmations {
                    break receipt;
                }
                debug!(
                    tx_hash = %tx_hash,
                    mined_at = mined_at,
                    current_block = current_block,
                    "Receipt found, waiting for confirmations"
                );
            } else {
                debug!(tx_hash = %tx_hash, "Receipt not found yet, polling");
            }

            tokio::time::sleep(self.receipt_poll).await;
        };

        if !receipt.status() {
            return Err(ChainError::VerificationFailed(
                "transaction reverted on chain".to_string(),
            ));
        }

        match receipt.to {
            Some(to) if to == self.contract_address => {}
            other => {
                return Err(ChainError::VerificationFailed(format!(
                    "transaction target {:?} is not the payment contract",
                    other
                )));
            }
        }

        let event = self
            .match_order_paid(receipt.inner.logs(), order_ref)
            .ok_or_else(|| {
                ChainError::VerificationFailed(format!(
                    "no OrderPaid event for order {} in receipt",
                    order_ref
                ))
            })?;

        let min_base_units = usdc_to_base_units(min_amount_usdc)?;
        if event.amount < min_base_units {
            return Err(ChainError::VerificationFailed(format!(
                "deposited amount {} below required {}",
                event.amount, min_base_units
            )));
        }

        let verification = DepositVerification {
            payer: format!("{:?}", event.payer),
            amount_usdc: base_units_to_usdc(event.amount),
            block_number: receipt.block_number.unwrap_or(0),
        };

        info!(
            order_ref = %order_ref,
            tx_hash = %tx_hash,
            payer = %verification.payer,
            amount_usdc = %verification.amount_usdc,
            "Deposit verified"
        );

        Ok(verification)
    }

    async fn send_refund(
        &self,
        order_ref: &str,
        receiver: &str,
        amount_usdc: Decimal,
    ) -> Result<String, ChainError> {
        let wallet = self.treasury.clone().ok_or(ChainError::SignerUnavailable)?;

        let receiver_address = Address::from_str(receiver).map_err(|e| {
            ChainError::TransactionError(format!("Invalid receiver address: {}", e))
        })?;
        let amount_base = usdc_to_base_units(amount_usdc)?;

        info!(
            order_ref = %order_ref,
            receiver = %receiver_address,
            amount_usdc = %amount_usdc,
            "Submitting refund"
        );

        // Signing provider is built per call; the refund path is rare and
        // the wallet-filled provider type does not unify with the read one.
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(
                self.rpc_url
                    .parse()
                    .map_err(|e| ChainError::ProviderError(format!("RPC URL error: {}", e)))?,
            );

        let contract = IAirtimePayments::new(self.contract_address, &provider);

        let pending_tx = contract
            .refund(order_ref.to_string(), receiver_address, amount_base)
            .send()
            .await
            .map_err(|e| {
                error!(order_ref = %order_ref, error = %e, "Failed to send refund transaction");
                ChainError::TransactionError(format!("Send failed: {}", e))
            })?;

        let tx_hash = format!("{:?}", pending_tx.tx_hash());
        info!(order_ref = %order_ref, tx_hash = %tx_hash, "Refund sent, awaiting confirmation");

        let receipt = pending_tx.get_receipt().await.map_err(|e| {
            error!(order_ref = %order_ref, error = %e, "Failed to get refund receipt");
            ChainError::TransactionError(format!("Receipt failed: {}", e))
        })?;

        if !receipt.status() {
            return Err(ChainError::TransactionError(
                "refund transaction reverted".to_string(),
            ));
        }

        info!(order_ref = %order_ref, tx_hash = %tx_hash, "Refund confirmed");
        Ok(tx_hash)
    }

    fn can_refund(&self) -> bool {
        self.treasury.is_some()
    }
}

/// Convert a USDC decimal amount to 6-decimal base units.
pub fn usdc_to_base_units(amount: Decimal) -> Result<U256, ChainError> {
    let multiplier = Decimal::from(10_u64.pow(USDC_DECIMALS));
    let scaled = (amount * multiplier).round_dp(0);
    let units = scaled
        .to_u128()
        .ok_or_else(|| ChainError::TransactionError(format!("amount {} out of range", amount)))?;
    Ok(U256::from(units))
}

/// Convert 6-decimal base units back to a USDC decimal amount.
pub fn base_units_to_usdc(amount: U256) -> Decimal {
    let divisor = Decimal::from(10_u64.pow(USDC_DECIMALS));
    let units = amount.to::<u128>();
    Decimal::from(units) / divisor
}
