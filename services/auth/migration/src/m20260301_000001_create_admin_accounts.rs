use sea_orm_migration::prelude::*;

/// The admin account table belongs to the surrounding application. It is
/// created here only if missing so a fresh database can run the auth service.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AdminAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AdminAccounts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AdminAccounts::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(AdminAccounts::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(AdminAccounts::DisplayName).string().not_null())
                    .col(
                        ColumnDef::new(AdminAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AdminAccounts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum AdminAccounts {
    Table,
    Id,
    Email,
    Username,
    DisplayName,
    CreatedAt,
}
