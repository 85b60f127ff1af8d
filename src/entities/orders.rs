//! SeaORM Entity for the orders table
//!
//! One row per airtime purchase order. `status`, `deposit_tx_hash` and
//! `refund_tx_hash` are only ever written through the conditional updates
//! in `services::order_store`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Public idempotency key, also the on-chain correlation key
    #[sea_orm(unique)]
    pub order_ref: String,
    pub phone_number: String,
    pub wallet_address: String,
    pub currency: String,
    /// Airtime face value in local currency
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub face_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub service_fee_usdc: Decimal,
    /// face_value / rate + service_fee_usdc, fixed at creation
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub total_usdc: Decimal,
    /// USDC -> local currency price snapshot at creation
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub rate: Decimal,
    pub status: String,
    pub deposit_tx_hash: Option<String>,
    pub refund_tx_hash: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))", nullable)]
    pub refund_amount_usdc: Option<Decimal>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::airtime_transactions::Entity")]
    AirtimeTransactions,
}

impl Related<super::airtime_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AirtimeTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
