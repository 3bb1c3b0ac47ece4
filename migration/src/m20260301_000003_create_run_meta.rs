use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RunMeta::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RunMeta::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RunMeta::Value).string().not_null())
                    .col(
                        ColumnDef::new(RunMeta::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RunMeta::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RunMeta {
    Table,
    Key,
    Value,
    UpdatedAt,
}
