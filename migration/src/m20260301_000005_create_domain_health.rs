use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DomainHealth::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DomainHealth::Domain)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DomainHealth::Addresses)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(DomainHealth::Status).string().not_null())
                    .col(
                        ColumnDef::new(DomainHealth::Reason)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(DomainHealth::FailureCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DomainHealth::ResolvedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DomainHealth::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DomainHealth {
    Table,
    Domain,
    Addresses,
    Status,
    Reason,
    FailureCount,
    ResolvedAt,
}
