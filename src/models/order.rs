use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::orders;

/// Order lifecycle states.
///
/// `Processing` is the transient claim state held by whichever worker won
/// the conditional update for a side-effecting step; orders never rest in
/// it. `Fulfilled` and `Refunded` are terminal; `Failed` is terminal and
/// flags the order for manual operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Fulfilled,
    Refunded,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "processing" => Some(OrderStatus::Processing),
            "fulfilled" => Some(OrderStatus::Fulfilled),
            "refunded" => Some(OrderStatus::Refunded),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Fulfilled | OrderStatus::Refunded | OrderStatus::Failed
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub phone_number: String,
    /// Airtime face value in the local currency of the phone's country
    pub amount: Decimal,
    pub wallet_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: i32,
    pub order_ref: String,
    pub currency: String,
    pub face_value: Decimal,
    pub service_fee_usdc: Decimal,
    pub total_usdc: Decimal,
    pub rate: Decimal,
}

/// Client polling view of an order. Mirrors the committed row only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_ref: String,
    pub phone_number: String,
    pub wallet_address: String,
    pub currency: String,
    pub face_value: Decimal,
    pub service_fee_usdc: Decimal,
    pub total_usdc: Decimal,
    pub rate: Decimal,
    pub status: String,
    pub deposit_tx_hash: Option<String>,
    pub refund_tx_hash: Option<String>,
    pub refund_amount_usdc: Option<Decimal>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

impl From<orders::Model> for OrderView {
    fn from(m: orders::Model) -> Self {
        OrderView {
            order_ref: m.order_ref,
            phone_number: m.phone_number,
            wallet_address: m.wallet_address,
            currency: m.currency,
            face_value: m.face_value,
            service_fee_usdc: m.service_fee_usdc,
            total_usdc: m.total_usdc,
            rate: m.rate,
            status: m.status,
            deposit_tx_hash: m.deposit_tx_hash,
            refund_tx_hash: m.refund_tx_hash,
            refund_amount_usdc: m.refund_amount_usdc,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
