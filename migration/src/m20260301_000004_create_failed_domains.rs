use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FailedDomains::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FailedDomains::Domain)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FailedDomains::Reason).string().not_null())
                    .col(
                        ColumnDef::new(FailedDomains::UrlCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(FailedDomains::Stage).string().not_null())
                    .col(
                        ColumnDef::new(FailedDomains::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FailedDomains::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FailedDomains {
    Table,
    Domain,
    Reason,
    UrlCount,
    Stage,
    RecordedAt,
}
