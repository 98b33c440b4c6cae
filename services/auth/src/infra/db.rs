use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde_json::Value;

use latchkey_auth_schema::{admin_accounts, audit_events, login_secrets};
use latchkey_domain::email::EmailAddress;
use latchkey_domain::id::{AdminAccountId, SecretId};

use crate::domain::repository::{AccountLookup, AuditRepository, SecretRepository};
use crate::domain::types::{AdminAccount, AuditEvent, Secret, SecretKind};
use crate::error::AuthServiceError;

// ── Account lookup ────────────────────────────────────────────────────────────

/// Reads the `admin_accounts` table maintained by the surrounding application.
/// Failures here are dependency errors: the account store is a collaborator.
#[derive(Clone)]
pub struct DbAccountLookup {
    pub db: DatabaseConnection,
}

impl AccountLookup for DbAccountLookup {
    async fn find_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<AdminAccount>, AuthServiceError> {
        let model = admin_accounts::Entity::find()
            .filter(admin_accounts::Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await
            .context("find admin account by email")
            .map_err(AuthServiceError::dependency)?;
        model.map(account_from_model).transpose()
    }

    async fn find_by_id(
        &self,
        id: AdminAccountId,
    ) -> Result<Option<AdminAccount>, AuthServiceError> {
        let model = admin_accounts::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find admin account by id")
            .map_err(AuthServiceError::dependency)?;
        model.map(account_from_model).transpose()
    }
}

fn account_from_model(model: admin_accounts::Model) -> Result<AdminAccount, AuthServiceError> {
    let email = EmailAddress::parse(&model.email)
        .with_context(|| format!("admin account {} has an unusable email", model.id))?;
    Ok(AdminAccount {
        id: AdminAccountId(model.id),
        email,
        username: model.username,
        display_name: model.display_name,
    })
}

// ── Secret repository ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbSecretRepository {
    pub db: DatabaseConnection,
}

impl SecretRepository for DbSecretRepository {
    async fn insert(&self, secret: &Secret) -> Result<(), AuthServiceError> {
        login_secrets::ActiveModel {
            id: Set(secret.id.0),
            kind: Set(secret.kind.as_str().to_owned()),
            secret_hash: Set(secret.secret_hash.clone()),
            subject: Set(secret.subject.clone()),
            issued_at: Set(secret.issued_at),
            expires_at: Set(secret.expires_at),
            consumed_at: Set(secret.consumed_at),
            revoked_at: Set(secret.revoked_at),
            origin_ip: Set(secret.origin_ip.clone()),
            user_agent: Set(secret.user_agent.clone()),
        }
        .insert(&self.db)
        .await
        .context("insert login secret")?;
        Ok(())
    }

    async fn find_by_hash(
        &self,
        kind: SecretKind,
        secret_hash: &str,
    ) -> Result<Option<Secret>, AuthServiceError> {
        let model = login_secrets::Entity::find()
            .filter(login_secrets::Column::SecretHash.eq(secret_hash))
            .filter(login_secrets::Column::Kind.eq(kind.as_str()))
            .one(&self.db)
            .await
            .context("find login secret by hash")?;
        model.map(secret_from_model).transpose()
    }

    async fn consume(&self, id: SecretId, now: DateTime<Utc>) -> Result<bool, AuthServiceError> {
        // Single conditional UPDATE: Postgres serializes concurrent writers on
        // the row, and only one of them still sees `consumed_at IS NULL`.
        let result = login_secrets::Entity::update_many()
            .col_expr(login_secrets::Column::ConsumedAt, Expr::value(now))
            .filter(login_secrets::Column::Id.eq(id.0))
            .filter(login_secrets::Column::ConsumedAt.is_null())
            .filter(login_secrets::Column::RevokedAt.is_null())
            .filter(login_secrets::Column::ExpiresAt.gt(now))
            .exec(&self.db)
            .await
            .context("consume login secret")?;
        Ok(result.rows_affected == 1)
    }

    async fn touch(&self, id: SecretId, now: DateTime<Utc>) -> Result<(), AuthServiceError> {
        login_secrets::Entity::update_many()
            .col_expr(login_secrets::Column::ConsumedAt, Expr::value(now))
            .filter(login_secrets::Column::Id.eq(id.0))
            .exec(&self.db)
            .await
            .context("touch login secret")?;
        Ok(())
    }

    async fn revoke_all_for(
        &self,
        kind: SecretKind,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthServiceError> {
        let result = login_secrets::Entity::update_many()
            .col_expr(login_secrets::Column::RevokedAt, Expr::value(now))
            .filter(login_secrets::Column::Kind.eq(kind.as_str()))
            .filter(login_secrets::Column::Subject.eq(subject))
            .filter(login_secrets::Column::RevokedAt.is_null())
            .filter(login_secrets::Column::ExpiresAt.gt(now))
            .exec(&self.db)
            .await
            .context("revoke login secrets for subject")?;
        Ok(result.rows_affected)
    }

    async fn revoke(
        &self,
        kind: SecretKind,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        let result = login_secrets::Entity::update_many()
            .col_expr(login_secrets::Column::RevokedAt, Expr::value(now))
            .filter(login_secrets::Column::Kind.eq(kind.as_str()))
            .filter(login_secrets::Column::SecretHash.eq(secret_hash))
            .filter(login_secrets::Column::RevokedAt.is_null())
            .exec(&self.db)
            .await
            .context("revoke login secret")?;
        Ok(result.rows_affected > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let result = login_secrets::Entity::delete_many()
            .filter(login_secrets::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .context("purge expired login secrets")?;
        Ok(result.rows_affected)
    }
}

fn secret_from_model(model: login_secrets::Model) -> Result<Secret, AuthServiceError> {
    let kind = SecretKind::parse(&model.kind)
        .with_context(|| format!("login secret {} has unknown kind {:?}", model.id, model.kind))?;
    Ok(Secret {
        id: SecretId(model.id),
        kind,
        secret_hash: model.secret_hash,
        subject: model.subject,
        issued_at: model.issued_at,
        expires_at: model.expires_at,
        consumed_at: model.consumed_at,
        revoked_at: model.revoked_at,
        origin_ip: model.origin_ip,
        user_agent: model.user_agent,
    })
}

// ── Audit repository ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbAuditRepository {
    pub db: DatabaseConnection,
}

impl AuditRepository for DbAuditRepository {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuthServiceError> {
        let metadata = Value::Object(
            event
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        audit_events::ActiveModel {
            id: Set(event.id),
            subject_id: Set(event.subject_id.map(|id| id.0)),
            event_type: Set(event.event_type.as_str().to_owned()),
            outcome: Set(event.outcome.as_str().to_owned()),
            ip_address: Set(event.ip_address.clone()),
            user_agent: Set(event.user_agent.clone()),
            metadata: Set(metadata),
            created_at: Set(event.timestamp),
        }
        .insert(&self.db)
        .await
        .context("append audit event")?;
        Ok(())
    }
}
