//! SeaORM Entity for the airtime_transactions table
//!
//! Append-only audit trail of provider dispatch attempts. At most one row
//! per order may sit in the non-terminal `Sent` state.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "airtime_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub order_id: i32,
    pub phone_number: String,
    #[sea_orm(column_type = "Decimal(Some((20, 2)))")]
    pub face_value: Decimal,
    pub currency: String,
    /// Assigned by the provider once the dispatch request is accepted
    #[sea_orm(unique, nullable)]
    pub provider_request_id: Option<String>,
    pub provider_status: String,
    pub error_message: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::orders::Entity",
        from = "Column::OrderId",
        to = "super::orders::Column::Id"
    )]
    Orders,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
