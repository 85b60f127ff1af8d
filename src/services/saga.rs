//! Order fulfillment saga coordinator
//!
//! Owns the Order state machine and drives the
//! verify -> dispatch -> confirm-or-compensate pipeline. There is no
//! resident coordinator process: whichever request arrives next (client
//! submit, client retry, provider webhook, poll) resumes the saga from the
//! committed state in the order store.
//!
//! Every forward edge of the state machine performs exactly one
//! irreversible external side effect (deposit observation, provider
//! dispatch, on-chain refund), so every edge is guarded by a conditional
//! write on the stored status. The transient `processing` status is the
//! claim a worker holds while it performs a side-effecting step; losers of
//! the conditional write either observe a terminal-equivalent state and
//! report success, or surface a conflict for the caller to retry.

use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::entities::orders;
use crate::models::airtime::ProviderStatus;
use crate::models::order::OrderStatus;
use crate::services::airtime_provider::{AirtimeProvider, ProviderError};
use crate::services::chain::{ChainClient, ChainError};
use crate::services::country;
use crate::services::order_store::{NewAirtimeTransaction, NewOrder, OrderStore, StoreError};
use crate::services::price_oracle::{PriceError, RateOracle};

/// Length of the public order reference
const ORDER_REF_LEN: usize = 8;

/// nanoid-compatible URL-safe alphabet
const ORDER_REF_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// USDC amounts are fixed to the token's 6 decimals
const USDC_SCALE: u32 = 6;

#[derive(Debug)]
pub enum SagaError {
    InvalidPhone(String),
    UnsupportedCountry(String),
    InvalidAmount {
        currency: String,
        min: Decimal,
        max: Decimal,
    },
    InvalidWallet(String),
    PriceUnavailable(String),
    OrderNotFound(String),
    OrderNotPending {
        order_ref: String,
        status: String,
    },
    /// A different deposit hash is already recorded for this order
    DepositMismatch {
        order_ref: String,
    },
    VerificationFailed(String),
    /// Receipt not confirmed within the wait budget; retryable, no state
    /// was changed
    NotYetConfirmed(String),
    /// Collaborator unreachable; retryable, no state was changed
    ExternalUnavailable(String),
    /// Another worker holds the processing claim for this order
    Conflict(String),
    TransactionNotFound(String),
    InvalidCallback(String),
    /// Refund execution failed; the order is `failed` and needs an operator
    CompensationFailed {
        order_ref: String,
        reason: String,
    },
    Storage(String),
}

impl std::fmt::Display for SagaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SagaError::InvalidPhone(phone) => write!(f, "Invalid phone number: {}", phone),
            SagaError::UnsupportedCountry(phone) => {
                write!(f, "No supported country for phone number: {}", phone)
            }
            SagaError::InvalidAmount { currency, min, max } => write!(
                f,
                "Amount out of bounds: must be between {} and {} {}",
                min, max, currency
            ),
            SagaError::InvalidWallet(wallet) => write!(f, "Invalid wallet address: {}", wallet),
            SagaError::PriceUnavailable(msg) => write!(f, "Price unavailable: {}", msg),
            SagaError::OrderNotFound(order_ref) => write!(f, "Order not found: {}", order_ref),
            SagaError::OrderNotPending { order_ref, status } => {
                write!(f, "Order {} is not pending (status: {})", order_ref, status)
            }
            SagaError::DepositMismatch { order_ref } => write!(
                f,
                "Order {} already has a different deposit transaction recorded",
                order_ref
            ),
            SagaError::VerificationFailed(msg) => write!(f, "Verification failed: {}", msg),
            SagaError::NotYetConfirmed(msg) => write!(f, "Not yet confirmed: {}", msg),
            SagaError::ExternalUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            SagaError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            SagaError::TransactionNotFound(request_id) => {
                write!(f, "Airtime transaction not found: {}", request_id)
            }
            SagaError::InvalidCallback(msg) => write!(f, "Invalid callback: {}", msg),
            SagaError::CompensationFailed { order_ref, reason } => write!(
                f,
                "Refund failed for order {}, manual intervention required: {}",
                order_ref, reason
            ),
            SagaError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for SagaError {}

impl From<StoreError> for SagaError {
    fn from(e: StoreError) -> Self {
        SagaError::Storage(e.to_string())
    }
}

impl From<PriceError> for SagaError {
    fn from(e: PriceError) -> Self {
        match e {
            PriceError::Unavailable(msg) => SagaError::PriceUnavailable(msg),
            PriceError::Upstream(msg) => SagaError::PriceUnavailable(msg),
            PriceError::Store(msg) => SagaError::Storage(msg),
        }
    }
}

/// Outcome of a payment submission.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Provider accepted the dispatch; delivery pending
    Dispatched { provider_request_id: Option<String> },
    /// A previous submission already dispatched; nothing re-sent
    AlreadyDispatched { provider_request_id: Option<String> },
    AlreadyFulfilled,
    AlreadyRefunded { refund_tx_hash: Option<String> },
    /// Provider rejected the dispatch and the deposit was refunded. A
    /// missing hash means the refund awaits manual treasury action.
    RefundedAfterRejection {
        refund_tx_hash: Option<String>,
        provider_error: String,
    },
}

/// Outcome of a provider delivery callback.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    Fulfilled,
    Refunded { refund_tx_hash: Option<String> },
    /// Order already settled; duplicate acknowledged without side effects
    AlreadyFinal { status: OrderStatus },
    /// Another worker is settling this order right now; acknowledged
    DuplicateInFlight,
    /// Intermediate notification with nothing to apply
    Acknowledged,
}

/// Result of one compensation execution. `refund_tx_hash` is `None` when
/// the treasury credential is absent and the refund needs manual action.
#[derive(Debug, Clone)]
struct RefundSettlement {
    refund_tx_hash: Option<String>,
}

pub struct SagaCoordinator {
    store: Arc<dyn OrderStore>,
    rates: Arc<dyn RateOracle>,
    chain: Arc<dyn ChainClient>,
    provider: Arc<dyn AirtimeProvider>,
    service_fee_usdc: Decimal,
    /// Best-effort de-duplication of concurrent identical submissions
    /// within this worker. Correctness relies on the store's conditional
    /// writes, never on this set.
    inflight: Arc<Mutex<HashSet<String>>>,
}

impl SagaCoordinator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        rates: Arc<dyn RateOracle>,
        chain: Arc<dyn ChainClient>,
        provider: Arc<dyn AirtimeProvider>,
        service_fee_usdc: Decimal,
    ) -> Self {
        Self {
            store,
            rates,
            chain,
            provider,
            service_fee_usdc,
            inflight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create an order in `pending` with all amounts fixed from a price
    /// snapshot taken now. Bounds are checked before the oracle is touched.
    pub async fn create_order(
        &self,
        phone_number: &str,
        face_value: Decimal,
        wallet_address: &str,
    ) -> Result<orders::Model, SagaError> {
        if !country::is_valid_phone(phone_number) {
            return Err(SagaError::InvalidPhone(phone_number.to_string()));
        }
        let profile = country::profile_for_phone(phone_number)
            .ok_or_else(|| SagaError::UnsupportedCountry(phone_number.to_string()))?;
        if !country::amount_within_bounds(profile, face_value) {
            return Err(SagaError::InvalidAmount {
                currency: profile.currency.to_string(),
                min: profile.min_face_value,
                max: profile.max_face_value,
            });
        }
        if !is_valid_wallet(wallet_address) {
            return Err(SagaError::InvalidWallet(wallet_address.to_string()));
        }

        let quote = self.rates.usdc_rate(profile.currency).await?;
        let (_, total_usdc) = compute_amounts(face_value, quote.rate, self.service_fee_usdc)?;

        let order = self
            .store
            .create_order(NewOrder {
                order_ref: generate_order_ref(),
                phone_number: phone_number.to_string(),
                wallet_address: wallet_address.to_string(),
                currency: profile.currency.to_string(),
                face_value,
                service_fee_usdc: self.service_fee_usdc,
                total_usdc,
                rate: quote.rate,
            })
            .await?;

        info!(
            order_ref = %order.order_ref,
            currency = %order.currency,
            face_value = %order.face_value,
            total_usdc = %order.total_usdc,
            rate = %order.rate,
            rate_from_fallback = quote.from_fallback,
            "Order created"
        );

        Ok(order)
    }

    /// Latest committed view of an order.
    pub async fn order_status(&self, order_ref: &str) -> Result<orders::Model, SagaError> {
        self.store
            .find_by_ref(order_ref)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(order_ref.to_string()))
    }

    /// Verify the deposit for an order and dispatch airtime.
    ///
    /// Safe to call repeatedly with the same `(order_ref, tx_hash)`: the
    /// same outcome is returned and at most one dispatch ever happens. A
    /// second call with a different hash is rejected once one is recorded.
    pub async fn submit_payment(
        &self,
        order_ref: &str,
        tx_hash: &str,
    ) -> Result<SubmitOutcome, SagaError> {
        let tx_hash = tx_hash.to_lowercase();
        if !is_valid_tx_hash(&tx_hash) {
            return Err(SagaError::VerificationFailed(format!(
                "malformed transaction hash: {}",
                tx_hash
            )));
        }

        let _guard = InflightGuard::try_acquire(&self.inflight, order_ref).ok_or_else(|| {
            SagaError::Conflict(format!("submission for {} already in progress", order_ref))
        })?;

        let order = self.order_status(order_ref).await?;

        // Write-once deposit guard: a different recorded hash is a replay
        // or tamper attempt, regardless of order state.
        if let Some(existing) = &order.deposit_tx_hash {
            if existing.to_lowercase() != tx_hash {
                warn!(
                    order_ref = %order_ref,
                    recorded = %existing,
                    submitted = %tx_hash,
                    "Deposit hash mismatch on resubmission"
                );
                return Err(SagaError::DepositMismatch {
                    order_ref: order_ref.to_string(),
                });
            }
        }

        match OrderStatus::parse(&order.status) {
            Some(OrderStatus::Fulfilled) => return Ok(SubmitOutcome::AlreadyFulfilled),
            Some(OrderStatus::Refunded) => {
                return Ok(SubmitOutcome::AlreadyRefunded {
                    refund_tx_hash: order.refund_tx_hash.clone(),
                });
            }
            Some(OrderStatus::Failed) => {
                return Err(SagaError::OrderNotPending {
                    order_ref: order_ref.to_string(),
                    status: order.status.clone(),
                });
            }
            Some(OrderStatus::Processing) => {
                return Err(SagaError::Conflict(format!(
                    "order {} is being processed",
                    order_ref
                )));
            }
            Some(OrderStatus::Pending) => {}
            None => {
                return Err(SagaError::Storage(format!(
                    "order {} has unknown status {}",
                    order_ref, order.status
                )));
            }
        }

        // Read-only verification happens before the claim so a slow chain
        // never holds the order hostage. Failure here leaves the order
        // pending and the client may retry with a corrected reference.
        self.chain
            .verify_deposit(&tx_hash, order_ref, order.total_usdc)
            .await
            .map_err(map_verify_error)?;

        // Claim the order for the dispatch step.
        let claim = self
            .store
            .transition_status(order.id, OrderStatus::Pending, OrderStatus::Processing)
            .await?;
        if !claim.applied {
            return self.settle_lost_claim(order_ref, &claim.current);
        }

        let recorded = self.store.record_deposit_tx(order.id, &tx_hash).await?;
        if !recorded.applied {
            let same = recorded
                .current
                .deposit_tx_hash
                .as_deref()
                .map(|h| h.eq_ignore_ascii_case(&tx_hash))
                .unwrap_or(false);
            if !same {
                self.release_claim(order.id).await;
                return Err(SagaError::DepositMismatch {
                    order_ref: order_ref.to_string(),
                });
            }
        }

        // A dispatch from an earlier submission may still be awaiting
        // delivery; never send a second one.
        if let Some(open) = self.store.find_open_airtime_for_order(order.id).await? {
            self.release_claim(order.id).await;
            info!(
                order_ref = %order_ref,
                request_id = ?open.provider_request_id,
                "Dispatch already in flight, skipping"
            );
            return Ok(SubmitOutcome::AlreadyDispatched {
                provider_request_id: open.provider_request_id,
            });
        }

        let dispatch = match self
            .provider
            .send_airtime(
                &order.phone_number,
                order.face_value,
                &order.currency,
                order_ref,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(ProviderError::Transport(msg)) => {
                // Delivery state unknown; release the claim and let the
                // caller retry. The provider de-duplicates on order_ref.
                self.release_claim(order.id).await;
                return Err(SagaError::ExternalUnavailable(msg));
            }
            Err(e) => {
                self.release_claim(order.id).await;
                return Err(SagaError::ExternalUnavailable(e.to_string()));
            }
        };

        if dispatch.accepted {
            let inserted = self
                .store
                .insert_airtime_transaction(NewAirtimeTransaction {
                    order_id: order.id,
                    phone_number: order.phone_number.clone(),
                    face_value: order.face_value,
                    currency: order.currency.clone(),
                    provider_request_id: dispatch.provider_request_id.clone(),
                    provider_status: ProviderStatus::Sent,
                    error_message: None,
                })
                .await;

            // The claim is released whether or not the audit insert
            // landed; a stuck `processing` order would block every retry.
            self.release_claim(order.id).await;
            inserted?;
            return Ok(SubmitOutcome::Dispatched {
                provider_request_id: dispatch.provider_request_id,
            });
        }

        // Immediate rejection: record the failed attempt, then compensate
        // while still holding the claim.
        let provider_error = dispatch
            .error_message
            .unwrap_or_else(|| "provider rejected the request".to_string());

        if let Err(e) = self
            .store
            .insert_airtime_transaction(NewAirtimeTransaction {
                order_id: order.id,
                phone_number: order.phone_number.clone(),
                face_value: order.face_value,
                currency: order.currency.clone(),
                provider_request_id: dispatch.provider_request_id,
                provider_status: ProviderStatus::Failed,
                error_message: Some(provider_error.clone()),
            })
            .await
        {
            self.release_claim(order.id).await;
            return Err(e.into());
        }

        let settlement = self.compensate(&recorded.current).await?;
        Ok(SubmitOutcome::RefundedAfterRejection {
            refund_tx_hash: settlement.refund_tx_hash,
            provider_error,
        })
    }

    /// Apply a provider delivery report. Idempotent: duplicates for settled
    /// orders are acknowledged without re-executing side effects.
    pub async fn handle_provider_callback(
        &self,
        provider_request_id: &str,
        status: &str,
        error_detail: Option<&str>,
    ) -> Result<CallbackOutcome, SagaError> {
        let status = ProviderStatus::parse(status)
            .ok_or_else(|| SagaError::InvalidCallback(format!("unknown status {}", status)))?;

        let (airtime_tx, order) = self
            .store
            .find_airtime_by_request_id(provider_request_id)
            .await?
            .ok_or_else(|| SagaError::TransactionNotFound(provider_request_id.to_string()))?;

        let order_status = OrderStatus::parse(&order.status).ok_or_else(|| {
            SagaError::Storage(format!(
                "order {} has unknown status {}",
                order.order_ref, order.status
            ))
        })?;

        if order_status.is_terminal() {
            info!(
                order_ref = %order.order_ref,
                request_id = %provider_request_id,
                status = %order.status,
                "Duplicate callback for settled order"
            );
            return Ok(CallbackOutcome::AlreadyFinal {
                status: order_status,
            });
        }

        match status {
            ProviderStatus::Sent => Ok(CallbackOutcome::Acknowledged),
            ProviderStatus::Success => self.settle_success(&airtime_tx, &order).await,
            ProviderStatus::Failed => {
                self.settle_failure(&airtime_tx, &order, error_detail).await
            }
        }
    }

    async fn settle_success(
        &self,
        airtime_tx: &crate::entities::airtime_transactions::Model,
        order: &orders::Model,
    ) -> Result<CallbackOutcome, SagaError> {
        // The resolution CAS decides nothing on its own; a redelivery after
        // a half-applied success must still drive the order forward.
        let resolved = self
            .store
            .resolve_airtime_status(
                airtime_tx.id,
                ProviderStatus::Sent,
                ProviderStatus::Success,
                None,
            )
            .await?;

        let cas = self
            .store
            .transition_status(order.id, OrderStatus::Pending, OrderStatus::Fulfilled)
            .await?;
        if cas.applied {
            info!(
                order_ref = %order.order_ref,
                request_id = ?airtime_tx.provider_request_id,
                "Airtime delivered, order fulfilled"
            );
            return Ok(CallbackOutcome::Fulfilled);
        }

        match OrderStatus::parse(&cas.current.status) {
            Some(s) if s.is_terminal() => Ok(CallbackOutcome::AlreadyFinal { status: s }),
            _ if !resolved => Ok(CallbackOutcome::DuplicateInFlight),
            // Another worker holds the claim for a different step; a non-2xx
            // answer makes the provider redeliver once it is released.
            _ => Err(SagaError::Conflict(format!(
                "order {} is being processed",
                order.order_ref
            ))),
        }
    }

    async fn settle_failure(
        &self,
        airtime_tx: &crate::entities::airtime_transactions::Model,
        order: &orders::Model,
        error_detail: Option<&str>,
    ) -> Result<CallbackOutcome, SagaError> {
        // Claim first: the claim, not the transaction row, decides which
        // worker runs compensation.
        let claim = self
            .store
            .transition_status(order.id, OrderStatus::Pending, OrderStatus::Processing)
            .await?;
        if !claim.applied {
            if let Some(status) = OrderStatus::parse(&claim.current.status) {
                if status.is_terminal() {
                    return Ok(CallbackOutcome::AlreadyFinal { status });
                }
            }
            // Claim held elsewhere. If the transaction row is already
            // resolved to Failed, the holder is a duplicate of this very
            // callback and will finish the refund; acknowledge. Otherwise
            // surface a conflict so the provider redelivers.
            let request_id = airtime_tx.provider_request_id.as_deref().unwrap_or_default();
            let row = self.store.find_airtime_by_request_id(request_id).await?;
            return match row {
                Some((tx, _)) if tx.provider_status == ProviderStatus::Failed.as_str() => {
                    Ok(CallbackOutcome::DuplicateInFlight)
                }
                _ => Err(SagaError::Conflict(format!(
                    "order {} is being processed",
                    order.order_ref
                ))),
            };
        }

        let detail = error_detail.unwrap_or("delivery failed");
        let resolved = self
            .store
            .resolve_airtime_status(
                airtime_tx.id,
                ProviderStatus::Sent,
                ProviderStatus::Failed,
                Some(detail),
            )
            .await?;
        if !resolved {
            // The row resolved under a concurrent delivery. A Success there
            // means the airtime actually arrived; refunding now would pay
            // the user twice. Back off and let the success path settle.
            let request_id = airtime_tx.provider_request_id.as_deref().unwrap_or_default();
            if let Some((tx, _)) = self.store.find_airtime_by_request_id(request_id).await? {
                if tx.provider_status == ProviderStatus::Success.as_str() {
                    warn!(
                        order_ref = %order.order_ref,
                        request_id = %request_id,
                        "Failure callback raced a delivered transaction; not refunding"
                    );
                    self.release_claim(order.id).await;
                    return Err(SagaError::Conflict(format!(
                        "conflicting delivery reports for order {}",
                        order.order_ref
                    )));
                }
            }
        }

        warn!(
            order_ref = %order.order_ref,
            request_id = ?airtime_tx.provider_request_id,
            error = %detail,
            "Delivery failed, compensating"
        );

        let settlement = self.compensate(order).await?;
        Ok(CallbackOutcome::Refunded {
            refund_tx_hash: settlement.refund_tx_hash,
        })
    }

    /// Execute the compensating refund for an order whose `processing`
    /// claim this worker holds.
    ///
    /// The refund amount is the deposit minus the non-refundable service
    /// fee, recorded before the chain call and never recomputed. Exactly
    /// one refund transaction is ever sent per order: the claim plus the
    /// write-once refund hash make a second attempt impossible.
    async fn compensate(&self, order: &orders::Model) -> Result<RefundSettlement, SagaError> {
        let computed = (order.total_usdc - order.service_fee_usdc).round_dp(USDC_SCALE);

        let recorded = self.store.record_refund_amount(order.id, computed).await?;
        // A prior attempt may have recorded the amount already; what was
        // recorded then is what gets refunded now.
        let amount = recorded
            .current
            .refund_amount_usdc
            .unwrap_or(computed);

        if !self.chain.can_refund() {
            warn!(
                order_ref = %order.order_ref,
                amount_usdc = %amount,
                "Treasury signer missing; marking refunded pending manual action"
            );
            self.store
                .record_refund_outcome(order.id, None, OrderStatus::Refunded)
                .await?;
            return Ok(RefundSettlement {
                refund_tx_hash: None,
            });
        }

        match self
            .chain
            .send_refund(&order.order_ref, &order.wallet_address, amount)
            .await
        {
            Ok(refund_tx_hash) => {
                let outcome = self
                    .store
                    .record_refund_outcome(order.id, Some(&refund_tx_hash), OrderStatus::Refunded)
                    .await?;
                if !outcome.applied {
                    error!(
                        order_ref = %order.order_ref,
                        refund_tx_hash = %refund_tx_hash,
                        status = %outcome.current.status,
                        "Refund confirmed but settlement write lost its claim"
                    );
                }
                info!(
                    order_ref = %order.order_ref,
                    refund_tx_hash = %refund_tx_hash,
                    amount_usdc = %amount,
                    "Refund executed, order refunded"
                );
                Ok(RefundSettlement {
                    refund_tx_hash: Some(refund_tx_hash),
                })
            }
            Err(e) => {
                error!(
                    order_ref = %order.order_ref,
                    amount_usdc = %amount,
                    error = %e,
                    "Refund execution failed, order needs manual intervention"
                );
                self.store
                    .record_refund_outcome(order.id, None, OrderStatus::Failed)
                    .await?;
                Err(SagaError::CompensationFailed {
                    order_ref: order.order_ref.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Map the committed state a lost submission claim revealed.
    fn settle_lost_claim(
        &self,
        order_ref: &str,
        current: &orders::Model,
    ) -> Result<SubmitOutcome, SagaError> {
        match OrderStatus::parse(&current.status) {
            Some(OrderStatus::Fulfilled) => Ok(SubmitOutcome::AlreadyFulfilled),
            Some(OrderStatus::Refunded) => Ok(SubmitOutcome::AlreadyRefunded {
                refund_tx_hash: current.refund_tx_hash.clone(),
            }),
            Some(OrderStatus::Failed) => Err(SagaError::OrderNotPending {
                order_ref: order_ref.to_string(),
                status: current.status.clone(),
            }),
            _ => Err(SagaError::Conflict(format!(
                "order {} is being processed",
                order_ref
            ))),
        }
    }

    async fn release_claim(&self, order_id: i32) {
        match self
            .store
            .transition_status(order_id, OrderStatus::Processing, OrderStatus::Pending)
            .await
        {
            Ok(outcome) if !outcome.applied => {
                error!(
                    order_id = order_id,
                    status = %outcome.current.status,
                    "Claim release found unexpected status"
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(order_id = order_id, error = %e, "Failed to release processing claim");
            }
        }
    }
}

fn map_verify_error(e: ChainError) -> SagaError {
    match e {
        ChainError::NotYetConfirmed(msg) => SagaError::NotYetConfirmed(msg),
        ChainError::VerificationFailed(msg) => SagaError::VerificationFailed(msg),
        ChainError::ProviderError(msg) => SagaError::ExternalUnavailable(msg),
        other => SagaError::VerificationFailed(other.to_string()),
    }
}

/// face_value / rate rounded to USDC scale, plus the service fee.
fn compute_amounts(
    face_value: Decimal,
    rate: Decimal,
    service_fee_usdc: Decimal,
) -> Result<(Decimal, Decimal), SagaError> {
    if rate <= Decimal::ZERO {
        return Err(SagaError::PriceUnavailable(format!(
            "non-positive rate {}",
            rate
        )));
    }
    let airtime_cost = (face_value / rate).round_dp(USDC_SCALE);
    let total = airtime_cost + service_fee_usdc;
    Ok((airtime_cost, total))
}

fn generate_order_ref() -> String {
    let mut rng = rand::thread_rng();
    (0..ORDER_REF_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ORDER_REF_ALPHABET.len());
            ORDER_REF_ALPHABET[idx] as char
        })
        .collect()
}

fn is_valid_wallet(wallet: &str) -> bool {
    wallet.starts_with("0x")
        && hex::decode(&wallet[2..])
            .map(|bytes| bytes.len() == 20)
            .unwrap_or(false)
}

fn is_valid_tx_hash(tx_hash: &str) -> bool {
    tx_hash.starts_with("0x")
        && hex::decode(&tx_hash[2..])
            .map(|bytes| bytes.len() == 32)
            .unwrap_or(false)
}

/// RAII entry in the in-process single-flight set.
struct InflightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InflightGuard {
    fn try_acquire(set: &Arc<Mutex<HashSet<String>>>, key: &str) -> Option<Self> {
        if !set.lock().insert(key.to_string()) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            key: key.to_string(),
        })
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}
