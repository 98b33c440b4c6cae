use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LoginSecrets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LoginSecrets::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LoginSecrets::Kind).string().not_null())
                    .col(
                        ColumnDef::new(LoginSecrets::SecretHash)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(LoginSecrets::Subject).string().not_null())
                    .col(
                        ColumnDef::new(LoginSecrets::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LoginSecrets::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LoginSecrets::ConsumedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(LoginSecrets::RevokedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(LoginSecrets::OriginIp).string())
                    .col(ColumnDef::new(LoginSecrets::UserAgent).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(LoginSecrets::Table)
                    .col(LoginSecrets::Kind)
                    .col(LoginSecrets::Subject)
                    .name("idx_login_secrets_kind_subject")
                    .to_owned(),
            )
            .await?;

        // Drives the periodic purge.
        manager
            .create_index(
                Index::create()
                    .table(LoginSecrets::Table)
                    .col(LoginSecrets::ExpiresAt)
                    .name("idx_login_secrets_expires_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LoginSecrets::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum LoginSecrets {
    Table,
    Id,
    Kind,
    SecretHash,
    Subject,
    IssuedAt,
    ExpiresAt,
    ConsumedAt,
    RevokedAt,
    OriginIp,
    UserAgent,
}
