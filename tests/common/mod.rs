//! Shared test fixtures: an in-memory order store with the same
//! conditional-write semantics as the SQL implementation, and mock
//! chain/provider/oracle collaborators with call counters.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use airpesa_backend::config::{AppConfig, ChainConfig, PriceConfig, PriceMode, ProviderConfig};
use airpesa_backend::entities::{airtime_transactions, orders, price_snapshots};
use airpesa_backend::models::airtime::ProviderStatus;
use airpesa_backend::models::order::OrderStatus;
use airpesa_backend::models::price::RateQuote;
use airpesa_backend::services::airtime_provider::{AirtimeProvider, DispatchOutcome, ProviderError};
use airpesa_backend::services::chain::{ChainClient, ChainError, DepositVerification};
use airpesa_backend::services::order_store::{
    CasOutcome, NewAirtimeTransaction, NewOrder, OrderStore, RateStore, StoreError,
};
use airpesa_backend::services::price_oracle::{PriceError, RateOracle};
use airpesa_backend::services::saga::SagaCoordinator;
use airpesa_backend::AppState;

// ---------------------------------------------------------------------------
// In-memory store

#[derive(Default)]
pub struct InMemoryStore {
    orders: Mutex<Vec<orders::Model>>,
    airtime: Mutex<Vec<airtime_transactions::Model>>,
    rates: Mutex<Vec<price_snapshots::Model>>,
    next_order_id: AtomicI32,
    next_airtime_id: AtomicI32,
    next_rate_id: AtomicI32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create_order(&self, order: NewOrder) -> Result<orders::Model, StoreError> {
        let now = Utc::now().fixed_offset();
        let model = orders::Model {
            id: self.next_order_id.fetch_add(1, Ordering::SeqCst) + 1,
            order_ref: order.order_ref,
            phone_number: order.phone_number,
            wallet_address: order.wallet_address,
            currency: order.currency,
            face_value: order.face_value,
            service_fee_usdc: order.service_fee_usdc,
            total_usdc: order.total_usdc,
            rate: order.rate,
            status: OrderStatus::Pending.as_str().to_string(),
            deposit_tx_hash: None,
            refund_tx_hash: None,
            refund_amount_usdc: None,
            created_at: now,
            updated_at: now,
        };
        self.orders.lock().push(model.clone());
        Ok(model)
    }

    async fn find_by_ref(&self, order_ref: &str) -> Result<Option<orders::Model>, StoreError> {
        Ok(self
            .orders
            .lock()
            .iter()
            .find(|o| o.order_ref == order_ref)
            .cloned())
    }

    async fn transition_status(
        &self,
        order_id: i32,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError> {
        let mut orders = self.orders.lock();
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| StoreError::RowVanished(format!("order {}", order_id)))?;
        let applied = order.status == from.as_str();
        if applied {
            order.status = to.as_str().to_string();
            order.updated_at = Utc::now().fixed_offset();
        }
        Ok(CasOutcome {
            applied,
            current: order.clone(),
        })
    }

    async fn record_deposit_tx(
        &self,
        order_id: i32,
        tx_hash: &str,
    ) -> Result<CasOutcome, StoreError> {
        let mut orders = self.orders.lock();
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| StoreError::RowVanished(format!("order {}", order_id)))?;
        let applied = order.deposit_tx_hash.is_none();
        if applied {
            order.deposit_tx_hash = Some(tx_hash.to_string());
            order.updated_at = Utc::now().fixed_offset();
        }
        Ok(CasOutcome {
            applied,
            current: order.clone(),
        })
    }

    async fn record_refund_amount(
        &self,
        order_id: i32,
        amount: Decimal,
    ) -> Result<CasOutcome, StoreError> {
        let mut orders = self.orders.lock();
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| StoreError::RowVanished(format!("order {}", order_id)))?;
        let applied = order.refund_amount_usdc.is_none();
        if applied {
            order.refund_amount_usdc = Some(amount);
            order.updated_at = Utc::now().fixed_offset();
        }
        Ok(CasOutcome {
            applied,
            current: order.clone(),
        })
    }

    async fn record_refund_outcome(
        &self,
        order_id: i32,
        refund_tx_hash: Option<&str>,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError> {
        let mut orders = self.orders.lock();
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| StoreError::RowVanished(format!("order {}", order_id)))?;
        let applied = order.status == OrderStatus::Processing.as_str()
            && order.refund_tx_hash.is_none();
        if applied {
            order.status = to.as_str().to_string();
            if let Some(hash) = refund_tx_hash {
                order.refund_tx_hash = Some(hash.to_string());
            }
            order.updated_at = Utc::now().fixed_offset();
        }
        Ok(CasOutcome {
            applied,
            current: order.clone(),
        })
    }

    async fn insert_airtime_transaction(
        &self,
        tx: NewAirtimeTransaction,
    ) -> Result<airtime_transactions::Model, StoreError> {
        let now = Utc::now().fixed_offset();
        let model = airtime_transactions::Model {
            id: self.next_airtime_id.fetch_add(1, Ordering::SeqCst) + 1,
            order_id: tx.order_id,
            phone_number: tx.phone_number,
            face_value: tx.face_value,
            currency: tx.currency,
            provider_request_id: tx.provider_request_id,
            provider_status: tx.provider_status.as_str().to_string(),
            error_message: tx.error_message,
            created_at: now,
            updated_at: now,
        };
        self.airtime.lock().push(model.clone());
        Ok(model)
    }

    async fn find_airtime_by_request_id(
        &self,
        provider_request_id: &str,
    ) -> Result<Option<(airtime_transactions::Model, orders::Model)>, StoreError> {
        let airtime = self.airtime.lock();
        let tx = match airtime
            .iter()
            .find(|t| t.provider_request_id.as_deref() == Some(provider_request_id))
        {
            Some(tx) => tx.clone(),
            None => return Ok(None),
        };
        drop(airtime);
        let order = self
            .orders
            .lock()
            .iter()
            .find(|o| o.id == tx.order_id)
            .cloned()
            .ok_or_else(|| StoreError::RowVanished(format!("order {}", tx.order_id)))?;
        Ok(Some((tx, order)))
    }

    async fn find_open_airtime_for_order(
        &self,
        order_id: i32,
    ) -> Result<Option<airtime_transactions::Model>, StoreError> {
        Ok(self
            .airtime
            .lock()
            .iter()
            .find(|t| {
                t.order_id == order_id && t.provider_status == ProviderStatus::Sent.as_str()
            })
            .cloned())
    }

    async fn resolve_airtime_status(
        &self,
        airtime_id: i32,
        from: ProviderStatus,
        to: ProviderStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut airtime = self.airtime.lock();
        let tx = airtime
            .iter_mut()
            .find(|t| t.id == airtime_id)
            .ok_or_else(|| StoreError::RowVanished(format!("airtime {}", airtime_id)))?;
        let applied = tx.provider_status == from.as_str();
        if applied {
            tx.provider_status = to.as_str().to_string();
            if let Some(message) = error_message {
                tx.error_message = Some(message.to_string());
            }
            tx.updated_at = Utc::now().fixed_offset();
        }
        Ok(applied)
    }

    async fn find_pending_order_for_validation(
        &self,
        phone_number: &str,
        face_value: Decimal,
    ) -> Result<Option<orders::Model>, StoreError> {
        Ok(self
            .orders
            .lock()
            .iter()
            .filter(|o| {
                o.phone_number == phone_number
                    && o.face_value == face_value
                    && o.status == OrderStatus::Pending.as_str()
            })
            .max_by_key(|o| o.created_at)
            .cloned())
    }
}

#[async_trait]
impl RateStore for InMemoryStore {
    async fn latest_rate(
        &self,
        token: &str,
        currency: &str,
    ) -> Result<Option<price_snapshots::Model>, StoreError> {
        Ok(self
            .rates
            .lock()
            .iter()
            .filter(|r| r.token == token && r.currency == currency)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn record_rate(
        &self,
        token: &str,
        currency: &str,
        rate: Decimal,
    ) -> Result<price_snapshots::Model, StoreError> {
        let model = price_snapshots::Model {
            id: self.next_rate_id.fetch_add(1, Ordering::SeqCst) + 1,
            token: token.to_string(),
            currency: currency.to_string(),
            rate,
            created_at: Utc::now().fixed_offset(),
        };
        self.rates.lock().push(model.clone());
        Ok(model)
    }
}

// ---------------------------------------------------------------------------
// Mock collaborators

#[derive(Clone, Copy)]
pub enum VerifyBehavior {
    Confirmed,
    WrongContract,
    MissingEvent,
    NotYetConfirmed,
    RpcDown,
}

#[derive(Clone, Copy)]
pub enum RefundBehavior {
    Confirmed,
    Reverted,
}

pub struct MockChain {
    pub verify_behavior: Mutex<VerifyBehavior>,
    pub refund_behavior: Mutex<RefundBehavior>,
    pub signer_available: bool,
    pub verify_calls: AtomicUsize,
    pub refund_calls: AtomicUsize,
    pub last_refund_amount: Mutex<Option<Decimal>>,
    pub last_refund_receiver: Mutex<Option<String>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            verify_behavior: Mutex::new(VerifyBehavior::Confirmed),
            refund_behavior: Mutex::new(RefundBehavior::Confirmed),
            signer_available: true,
            verify_calls: AtomicUsize::new(0),
            refund_calls: AtomicUsize::new(0),
            last_refund_amount: Mutex::new(None),
            last_refund_receiver: Mutex::new(None),
        }
    }

    pub fn without_signer() -> Self {
        Self {
            signer_available: false,
            ..Self::new()
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn verify_deposit(
        &self,
        _tx_hash: &str,
        _order_ref: &str,
        min_amount_usdc: Decimal,
    ) -> Result<DepositVerification, ChainError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match *self.verify_behavior.lock() {
            VerifyBehavior::Confirmed => Ok(DepositVerification {
                payer: "0x00000000000000000000000000000000000000aa".to_string(),
                amount_usdc: min_amount_usdc,
                block_number: 1000,
            }),
            VerifyBehavior::WrongContract => Err(ChainError::VerificationFailed(
                "transaction target is not the payment contract".to_string(),
            )),
            VerifyBehavior::MissingEvent => Err(ChainError::VerificationFailed(
                "no OrderPaid event in receipt".to_string(),
            )),
            VerifyBehavior::NotYetConfirmed => Err(ChainError::NotYetConfirmed(
                "no confirmed receipt within 60s".to_string(),
            )),
            VerifyBehavior::RpcDown => {
                Err(ChainError::ProviderError("connection refused".to_string()))
            }
        }
    }

    async fn send_refund(
        &self,
        _order_ref: &str,
        receiver: &str,
        amount_usdc: Decimal,
    ) -> Result<String, ChainError> {
        let call = self.refund_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_refund_amount.lock() = Some(amount_usdc);
        *self.last_refund_receiver.lock() = Some(receiver.to_string());
        // Widen race windows a little for the concurrency tests
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        match *self.refund_behavior.lock() {
            RefundBehavior::Confirmed => Ok(format!("0x{:064x}", call)),
            RefundBehavior::Reverted => Err(ChainError::TransactionError(
                "refund transaction reverted".to_string(),
            )),
        }
    }

    fn can_refund(&self) -> bool {
        self.signer_available
    }
}

#[derive(Clone)]
pub enum DispatchBehavior {
    Accept,
    Reject(String),
    Unreachable,
}

pub struct MockProvider {
    pub behavior: Mutex<DispatchBehavior>,
    pub dispatch_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(DispatchBehavior::Accept),
            dispatch_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AirtimeProvider for MockProvider {
    async fn send_airtime(
        &self,
        _phone_number: &str,
        _face_value: Decimal,
        _currency: &str,
        _order_ref: &str,
    ) -> Result<DispatchOutcome, ProviderError> {
        let call = self.dispatch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.behavior.lock().clone() {
            DispatchBehavior::Accept => Ok(DispatchOutcome {
                accepted: true,
                provider_request_id: Some(format!("ATQid_{}", call)),
                error_message: None,
            }),
            DispatchBehavior::Reject(reason) => Ok(DispatchOutcome {
                accepted: false,
                provider_request_id: None,
                error_message: Some(reason),
            }),
            DispatchBehavior::Unreachable => {
                Err(ProviderError::Transport("connection timed out".to_string()))
            }
        }
    }
}

pub struct MockOracle {
    pub rate: Decimal,
    pub available: bool,
}

impl MockOracle {
    pub fn with_rate(rate: Decimal) -> Self {
        Self {
            rate,
            available: true,
        }
    }

    #[allow(dead_code)]
    pub fn unavailable() -> Self {
        Self {
            rate: Decimal::ZERO,
            available: false,
        }
    }
}

#[async_trait]
impl RateOracle for MockOracle {
    async fn usdc_rate(&self, _currency: &str) -> Result<RateQuote, PriceError> {
        if !self.available {
            return Err(PriceError::Unavailable("oracle down".to_string()));
        }
        Ok(RateQuote {
            rate: self.rate,
            as_of: Utc::now(),
            from_fallback: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Fixture wiring

pub struct TestHarness {
    pub store: Arc<InMemoryStore>,
    pub chain: Arc<MockChain>,
    pub provider: Arc<MockProvider>,
    pub saga: Arc<SagaCoordinator>,
}

pub const TEST_WALLET: &str = "0x742d35cc6634c0532925a3b844bc454e4438f44e";
pub const TEST_PHONE: &str = "+254712345678";

pub fn tx_hash(n: u8) -> String {
    format!("0x{}", hex::encode([n; 32]))
}

/// Coordinator wired to the in-memory store and mocks: 129 KES/USDC,
/// 0.05 USDC service fee.
pub fn harness() -> TestHarness {
    harness_with(MockChain::new(), MockProvider::new())
}

pub fn harness_with(chain: MockChain, provider: MockProvider) -> TestHarness {
    let store = Arc::new(InMemoryStore::new());
    let chain = Arc::new(chain);
    let provider = Arc::new(provider);
    let saga = Arc::new(SagaCoordinator::new(
        store.clone(),
        Arc::new(MockOracle::with_rate(dec!(129))),
        chain.clone(),
        provider.clone(),
        dec!(0.05),
    ));
    TestHarness {
        store,
        chain,
        provider,
        saga,
    }
}

/// Full HTTP state over the same fixtures, for router tests.
#[allow(dead_code)]
pub fn app_state(harness: &TestHarness) -> AppState {
    AppState {
        saga: harness.saga.clone(),
        store: harness.store.clone(),
        rates: Arc::new(MockOracle::with_rate(dec!(129))),
        config: Arc::new(test_config()),
    }
}

#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgresql://unused".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        chain: ChainConfig {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 8453,
            payment_contract_address: "0x0000000000000000000000000000000000000001".to_string(),
            treasury_private_key: None,
            confirmations: 1,
            receipt_timeout_secs: 5,
            receipt_poll_ms: 100,
        },
        provider: ProviderConfig {
            username: "sandbox".to_string(),
            api_key: "test-key".to_string(),
            base_url: "http://localhost:9000/airtime".to_string(),
        },
        price: PriceConfig {
            base_url: "http://localhost:9001".to_string(),
            mode: PriceMode::Fallback,
            cache_ttl_secs: 300,
        },
        service_fee_usdc: dec!(0.05),
        callback_trusted_ips: vec!["196.250.215.198".to_string()],
    }
}
