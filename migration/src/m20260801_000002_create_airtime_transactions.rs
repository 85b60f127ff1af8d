use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AirtimeTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AirtimeTransactions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AirtimeTransactions::OrderId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AirtimeTransactions::PhoneNumber)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AirtimeTransactions::FaceValue)
                            .decimal_len(20, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AirtimeTransactions::Currency)
                            .string_len(8)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AirtimeTransactions::ProviderRequestId)
                            .string_len(64)
                            .null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(AirtimeTransactions::ProviderStatus)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(AirtimeTransactions::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(AirtimeTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .col(
                        ColumnDef::new(AirtimeTransactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_airtime_transactions_order")
                            .from(AirtimeTransactions::Table, AirtimeTransactions::OrderId)
                            .to(Orders::Table, Orders::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_airtime_transactions_order_id")
                    .table(AirtimeTransactions::Table)
                    .col(AirtimeTransactions::OrderId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AirtimeTransactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AirtimeTransactions {
    Table,
    Id,
    OrderId,
    PhoneNumber,
    FaceValue,
    Currency,
    ProviderRequestId,
    ProviderStatus,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
}
