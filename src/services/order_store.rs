//! Order repository
//!
//! `OrderStore` is the single source of truth for the saga. Every
//! state-changing operation is a single conditional `UPDATE` whose filter
//! carries the expected current value; the row count decides who won.
//! There is no read-then-write gap anywhere in this module.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, Order, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::entities::{airtime_transactions, orders, price_snapshots, prelude::*};
use crate::models::airtime::ProviderStatus;
use crate::models::order::OrderStatus;

#[derive(Debug)]
pub enum StoreError {
    Database(String),
    /// Row state did not permit the write and no current row could be read
    RowVanished(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
            StoreError::RowVanished(what) => write!(f, "Row disappeared mid-update: {}", what),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Result of a conditional write: whether this caller's write applied, and
/// the committed row either way. Losers inspect `current` to decide between
/// idempotent success and conflict.
#[derive(Debug, Clone)]
pub struct CasOutcome {
    pub applied: bool,
    pub current: orders::Model,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_ref: String,
    pub phone_number: String,
    pub wallet_address: String,
    pub currency: String,
    pub face_value: Decimal,
    pub service_fee_usdc: Decimal,
    pub total_usdc: Decimal,
    pub rate: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewAirtimeTransaction {
    pub order_id: i32,
    pub phone_number: String,
    pub face_value: Decimal,
    pub currency: String,
    pub provider_request_id: Option<String>,
    pub provider_status: ProviderStatus,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: NewOrder) -> Result<orders::Model, StoreError>;

    async fn find_by_ref(&self, order_ref: &str) -> Result<Option<orders::Model>, StoreError>;

    /// Compare-and-swap on `status`. Applied only if the stored status
    /// still equals `from`.
    async fn transition_status(
        &self,
        order_id: i32,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError>;

    /// Write-once deposit hash: applied only while the column is NULL.
    async fn record_deposit_tx(&self, order_id: i32, tx_hash: &str)
        -> Result<CasOutcome, StoreError>;

    /// Write-once refund amount, recorded before the refund is submitted.
    async fn record_refund_amount(
        &self,
        order_id: i32,
        amount: Decimal,
    ) -> Result<CasOutcome, StoreError>;

    /// Settle a compensation attempt: moves `processing` -> `to` and sets
    /// the refund hash (write-once). `to` is `Refunded` or `Failed`.
    async fn record_refund_outcome(
        &self,
        order_id: i32,
        refund_tx_hash: Option<&str>,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError>;

    async fn insert_airtime_transaction(
        &self,
        tx: NewAirtimeTransaction,
    ) -> Result<airtime_transactions::Model, StoreError>;

    async fn find_airtime_by_request_id(
        &self,
        provider_request_id: &str,
    ) -> Result<Option<(airtime_transactions::Model, orders::Model)>, StoreError>;

    /// The order's dispatch still awaiting delivery, if any.
    async fn find_open_airtime_for_order(
        &self,
        order_id: i32,
    ) -> Result<Option<airtime_transactions::Model>, StoreError>;

    /// Compare-and-swap on `provider_status`. Returns whether this caller
    /// performed the resolution.
    async fn resolve_airtime_status(
        &self,
        airtime_id: i32,
        from: ProviderStatus,
        to: ProviderStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Latest pending order matching the provider validation callback.
    async fn find_pending_order_for_validation(
        &self,
        phone_number: &str,
        face_value: Decimal,
    ) -> Result<Option<orders::Model>, StoreError>;
}

#[async_trait]
pub trait RateStore: Send + Sync {
    async fn latest_rate(
        &self,
        token: &str,
        currency: &str,
    ) -> Result<Option<price_snapshots::Model>, StoreError>;

    async fn record_rate(
        &self,
        token: &str,
        currency: &str,
        rate: Decimal,
    ) -> Result<price_snapshots::Model, StoreError>;
}

/// PostgreSQL implementation over SeaORM.
#[derive(Clone)]
pub struct SeaOrmOrderStore {
    db: DatabaseConnection,
}

impl SeaOrmOrderStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn reload(&self, order_id: i32) -> Result<orders::Model, StoreError> {
        Orders::find_by_id(order_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::RowVanished(format!("order {}", order_id)))
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<orders::Model, StoreError> {
        let now = Utc::now().fixed_offset();
        let model = orders::ActiveModel {
            order_ref: Set(order.order_ref),
            phone_number: Set(order.phone_number),
            wallet_address: Set(order.wallet_address),
            currency: Set(order.currency),
            face_value: Set(order.face_value),
            service_fee_usdc: Set(order.service_fee_usdc),
            total_usdc: Set(order.total_usdc),
            rate: Set(order.rate),
            status: Set(OrderStatus::Pending.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn find_by_ref(&self, order_ref: &str) -> Result<Option<orders::Model>, StoreError> {
        Ok(Orders::find()
            .filter(orders::Column::OrderRef.eq(order_ref))
            .one(&self.db)
            .await?)
    }

    async fn transition_status(
        &self,
        order_id: i32,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError> {
        let res = Orders::update_many()
            .col_expr(orders::Column::Status, Expr::value(to.as_str()))
            .col_expr(
                orders::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::Status.eq(from.as_str()))
            .exec(&self.db)
            .await?;

        let current = self.reload(order_id).await?;
        Ok(CasOutcome {
            applied: res.rows_affected == 1,
            current,
        })
    }

    async fn record_deposit_tx(
        &self,
        order_id: i32,
        tx_hash: &str,
    ) -> Result<CasOutcome, StoreError> {
        let res = Orders::update_many()
            .col_expr(orders::Column::DepositTxHash, Expr::value(tx_hash))
            .col_expr(
                orders::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::DepositTxHash.is_null())
            .exec(&self.db)
            .await?;

        let current = self.reload(order_id).await?;
        Ok(CasOutcome {
            applied: res.rows_affected == 1,
            current,
        })
    }

    async fn record_refund_amount(
        &self,
        order_id: i32,
        amount: Decimal,
    ) -> Result<CasOutcome, StoreError> {
        let res = Orders::update_many()
            .col_expr(orders::Column::RefundAmountUsdc, Expr::value(amount))
            .col_expr(
                orders::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::RefundAmountUsdc.is_null())
            .exec(&self.db)
            .await?;

        let current = self.reload(order_id).await?;
        Ok(CasOutcome {
            applied: res.rows_affected == 1,
            current,
        })
    }

    async fn record_refund_outcome(
        &self,
        order_id: i32,
        refund_tx_hash: Option<&str>,
        to: OrderStatus,
    ) -> Result<CasOutcome, StoreError> {
        let mut update = Orders::update_many()
            .col_expr(orders::Column::Status, Expr::value(to.as_str()))
            .col_expr(
                orders::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(orders::Column::Id.eq(order_id))
            .filter(orders::Column::Status.eq(OrderStatus::Processing.as_str()))
            .filter(orders::Column::RefundTxHash.is_null());
        if let Some(hash) = refund_tx_hash {
            update = update.col_expr(orders::Column::RefundTxHash, Expr::value(hash));
        }
        let res = update.exec(&self.db).await?;

        let current = self.reload(order_id).await?;
        Ok(CasOutcome {
            applied: res.rows_affected == 1,
            current,
        })
    }

    async fn insert_airtime_transaction(
        &self,
        tx: NewAirtimeTransaction,
    ) -> Result<airtime_transactions::Model, StoreError> {
        let now = Utc::now().fixed_offset();
        let model = airtime_transactions::ActiveModel {
            order_id: Set(tx.order_id),
            phone_number: Set(tx.phone_number),
            face_value: Set(tx.face_value),
            currency: Set(tx.currency),
            provider_request_id: Set(tx.provider_request_id),
            provider_status: Set(tx.provider_status.as_str().to_string()),
            error_message: Set(tx.error_message),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn find_airtime_by_request_id(
        &self,
        provider_request_id: &str,
    ) -> Result<Option<(airtime_transactions::Model, orders::Model)>, StoreError> {
        let found = AirtimeTransactions::find()
            .filter(airtime_transactions::Column::ProviderRequestId.eq(provider_request_id))
            .find_also_related(Orders)
            .one(&self.db)
            .await?;

        match found {
            Some((tx, Some(order))) => Ok(Some((tx, order))),
            Some((tx, None)) => Err(StoreError::RowVanished(format!(
                "order {} for airtime transaction {}",
                tx.order_id, tx.id
            ))),
            None => Ok(None),
        }
    }

    async fn find_open_airtime_for_order(
        &self,
        order_id: i32,
    ) -> Result<Option<airtime_transactions::Model>, StoreError> {
        Ok(AirtimeTransactions::find()
            .filter(airtime_transactions::Column::OrderId.eq(order_id))
            .filter(
                airtime_transactions::Column::ProviderStatus.eq(ProviderStatus::Sent.as_str()),
            )
            .one(&self.db)
            .await?)
    }

    async fn resolve_airtime_status(
        &self,
        airtime_id: i32,
        from: ProviderStatus,
        to: ProviderStatus,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut update = AirtimeTransactions::update_many()
            .col_expr(
                airtime_transactions::Column::ProviderStatus,
                Expr::value(to.as_str()),
            )
            .col_expr(
                airtime_transactions::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(airtime_transactions::Column::Id.eq(airtime_id))
            .filter(airtime_transactions::Column::ProviderStatus.eq(from.as_str()));
        if let Some(message) = error_message {
            update = update.col_expr(
                airtime_transactions::Column::ErrorMessage,
                Expr::value(message),
            );
        }
        let res = update.exec(&self.db).await?;
        Ok(res.rows_affected == 1)
    }

    async fn find_pending_order_for_validation(
        &self,
        phone_number: &str,
        face_value: Decimal,
    ) -> Result<Option<orders::Model>, StoreError> {
        Ok(Orders::find()
            .filter(orders::Column::PhoneNumber.eq(phone_number))
            .filter(orders::Column::FaceValue.eq(face_value))
            .filter(orders::Column::Status.eq(OrderStatus::Pending.as_str()))
            .order_by(orders::Column::CreatedAt, Order::Desc)
            .limit(1)
            .one(&self.db)
            .await?)
    }
}

#[async_trait]
impl RateStore for SeaOrmOrderStore {
    async fn latest_rate(
        &self,
        token: &str,
        currency: &str,
    ) -> Result<Option<price_snapshots::Model>, StoreError> {
        Ok(PriceSnapshots::find()
            .filter(price_snapshots::Column::Token.eq(token))
            .filter(price_snapshots::Column::Currency.eq(currency))
            .order_by(price_snapshots::Column::CreatedAt, Order::Desc)
            .limit(1)
            .one(&self.db)
            .await?)
    }

    async fn record_rate(
        &self,
        token: &str,
        currency: &str,
        rate: Decimal,
    ) -> Result<price_snapshots::Model, StoreError> {
        let model = price_snapshots::ActiveModel {
            token: Set(token.to_string()),
            currency: Set(currency.to_string()),
            rate: Set(rate),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }
}
