use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FetchResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FetchResults::Url)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FetchResults::Domain).string().not_null())
                    .col(ColumnDef::new(FetchResults::Outcome).string().not_null())
                    .col(ColumnDef::new(FetchResults::StatusCode).integer().null())
                    .col(ColumnDef::new(FetchResults::ErrorClass).string().null())
                    .col(ColumnDef::new(FetchResults::Error).string().null())
                    .col(
                        ColumnDef::new(FetchResults::BytesRead)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(FetchResults::ContentLength).big_integer().null())
                    .col(ColumnDef::new(FetchResults::ContentType).string().null())
                    .col(ColumnDef::new(FetchResults::RedirectUrl).string().null())
                    .col(
                        ColumnDef::new(FetchResults::LatencyMs)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(FetchResults::Mode).string().not_null())
                    .col(
                        ColumnDef::new(FetchResults::FetchedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_fetch_results_domain")
                    .table(FetchResults::Table)
                    .col(FetchResults::Domain)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FetchResults::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FetchResults {
    Table,
    Url,
    Domain,
    Outcome,
    StatusCode,
    ErrorClass,
    Error,
    BytesRead,
    ContentLength,
    ContentType,
    RedirectUrl,
    LatencyMs,
    Mode,
    FetchedAt,
}
