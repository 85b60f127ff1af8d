pub use super::airtime_transactions::Entity as AirtimeTransactions;
pub use super::orders::Entity as Orders;
pub use super::price_snapshots::Entity as PriceSnapshots;
