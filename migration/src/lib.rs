pub use sea_orm_migration::prelude::*;

mod m20260801_000001_create_orders;
mod m20260801_000002_create_airtime_transactions;
mod m20260801_000003_create_price_snapshots;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260801_000001_create_orders::Migration),
            Box::new(m20260801_000002_create_airtime_transactions::Migration),
            Box::new(m20260801_000003_create_price_snapshots::Migration),
        ]
    }
}
