use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PriceSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PriceSnapshots::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PriceSnapshots::Token)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceSnapshots::Currency)
                            .string_len(8)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceSnapshots::Rate)
                            .decimal_len(20, 6)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceSnapshots::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_price_snapshots_pair_created")
                    .table(PriceSnapshots::Table)
                    .col(PriceSnapshots::Token)
                    .col(PriceSnapshots::Currency)
                    .col(PriceSnapshots::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PriceSnapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PriceSnapshots {
    Table,
    Id,
    Token,
    Currency,
    Rate,
    CreatedAt,
}
