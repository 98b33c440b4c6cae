//! Ports the use cases are written against.
//!
//! Every method returns a `Send` future so generic use cases can run inside
//! axum handlers and spawned tasks. Implementations are free to write
//! `async fn`.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};

use latchkey_domain::email::EmailAddress;
use latchkey_domain::id::{AdminAccountId, SecretId};

use crate::domain::types::{AdminAccount, AuditEvent, EmailMessage, Secret, SecretKind, Session};
use crate::error::AuthServiceError;

/// Port for resolving admin accounts owned by the surrounding application.
pub trait AccountLookup: Send + Sync {
    fn find_by_email(
        &self,
        email: &EmailAddress,
    ) -> impl Future<Output = Result<Option<AdminAccount>, AuthServiceError>> + Send;

    fn find_by_id(
        &self,
        id: AdminAccountId,
    ) -> impl Future<Output = Result<Option<AdminAccount>, AuthServiceError>> + Send;
}

/// Persistence for hashed secrets.
pub trait SecretRepository: Send + Sync {
    fn insert(&self, secret: &Secret) -> impl Future<Output = Result<(), AuthServiceError>> + Send;

    fn find_by_hash(
        &self,
        kind: SecretKind,
        secret_hash: &str,
    ) -> impl Future<Output = Result<Option<Secret>, AuthServiceError>> + Send;

    /// Atomically set `consumed_at = now` if the row is still unconsumed,
    /// unrevoked and unexpired. Returns `true` only for the caller that won.
    fn consume(
        &self,
        id: SecretId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, AuthServiceError>> + Send;

    /// Stamp `consumed_at = now` as a last-used marker without any condition.
    fn touch(
        &self,
        id: SecretId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send;

    /// Set `revoked_at = now` on every live row of `kind` for `subject`.
    fn revoke_all_for(
        &self,
        kind: SecretKind,
        subject: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, AuthServiceError>> + Send;

    /// Revoke a single row. Returns `false` when nothing live matched.
    fn revoke(
        &self,
        kind: SecretKind,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, AuthServiceError>> + Send;

    /// Delete rows whose `expires_at <= now`. Returns the number deleted.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, AuthServiceError>> + Send;
}

/// Keyed sliding-log counter for issuance attempts.
pub trait RateLimitStore: Send + Sync {
    /// Admit and log an attempt at `now` when fewer than `limit` admitted
    /// attempts exist in `(now - window, now]`. Blocked attempts are not logged.
    fn record_attempt(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, AuthServiceError>> + Send;
}

/// Append-only sink for audit events.
pub trait AuditRepository: Send + Sync {
    fn append(
        &self,
        event: &AuditEvent,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send;
}

/// Pluggable session storage (in-memory or shared cache).
pub trait SessionStore: Send + Sync {
    fn put(
        &self,
        session: &Session,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send;

    fn get(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Session>, AuthServiceError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), AuthServiceError>> + Send;
}

/// Outbound mail transport.
///
/// The returned future is `Send` so delivery can run on a spawned task (login
/// notifications are fire-and-forget).
pub trait EmailSender: Send + Sync {
    fn send(
        &self,
        message: &EmailMessage,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send;
}
