use std::time::Duration as StdDuration;

use latchkey_auth_types::origin::ClientOrigin;
use latchkey_domain::id::AdminAccountId;

use crate::domain::repository::{AccountLookup, AuditRepository, SecretRepository, SessionStore};
use crate::domain::types::{
    AuditEvent, EventType, IssuedSecret, Outcome, RememberMePolicy, SecretKind, SessionHandle,
};
use crate::error::AuthServiceError;
use crate::usecase::audit::AuditLog;
use crate::usecase::bounded;
use crate::usecase::secret::SecretStore;
use crate::usecase::session::SessionEstablisher;

/// Long-lived, multi-use auto-login credential bound to an admin account.
/// Presenting it never consumes it; only `expires_at` or a revoke ends it.
#[derive(Clone)]
pub struct RememberMeService<R: SecretRepository, A: AuditRepository> {
    pub secrets: SecretStore<R>,
    pub audit: AuditLog<A>,
    pub policy: RememberMePolicy,
}

impl<R: SecretRepository, A: AuditRepository> RememberMeService<R, A> {
    pub async fn issue(
        &self,
        account: AdminAccountId,
        origin: &ClientOrigin,
    ) -> Result<IssuedSecret, AuthServiceError> {
        let issued = self
            .secrets
            .issue(
                SecretKind::RememberMe,
                &account.to_string(),
                self.policy.ttl,
                Some(origin),
            )
            .await?;
        self.audit
            .record(
                AuditEvent::new(EventType::RememberMeIssued, Outcome::Success)
                    .with_subject(account)
                    .with_origin(origin)
                    .with_detail("expires_at", issued.expires_at.to_rfc3339()),
            )
            .await;
        Ok(issued)
    }

    /// Resolve a presented bearer value to its account. Any failure is audited
    /// with its reason; the caller should clear the cookie.
    pub async fn validate(
        &self,
        bearer: &str,
        origin: &ClientOrigin,
    ) -> Result<AdminAccountId, AuthServiceError> {
        let result = self
            .secrets
            .validate_and_consume(SecretKind::RememberMe, bearer)
            .await
            .and_then(|secret| {
                secret.subject.parse::<AdminAccountId>().map_err(|e| {
                    AuthServiceError::Internal(anyhow::anyhow!(
                        "remember-me secret {} has a non-uuid subject: {e}",
                        secret.id
                    ))
                })
            });

        if let Err(AuthServiceError::Credential(reason)) = &result {
            self.audit
                .record(
                    AuditEvent::new(EventType::RememberMeInvalid, Outcome::Failed)
                        .with_origin(origin)
                        .with_detail("reason", reason.reason()),
                )
                .await;
        }
        result
    }

    /// Revoke the secret behind a bearer value (logout). Unknown values are a
    /// no-op and return `false`.
    pub async fn revoke(
        &self,
        bearer: &str,
        subject: Option<AdminAccountId>,
        origin: &ClientOrigin,
    ) -> Result<bool, AuthServiceError> {
        let revoked = self.secrets.revoke(SecretKind::RememberMe, bearer).await?;
        if revoked {
            let mut event =
                AuditEvent::new(EventType::RememberMeRevoked, Outcome::Success).with_origin(origin);
            if let Some(subject) = subject {
                event = event.with_subject(subject);
            }
            self.audit.record(event).await;
        }
        Ok(revoked)
    }

    /// Revoke every remember-me secret of one account.
    pub async fn revoke_all_for(&self, account: AdminAccountId) -> Result<u64, AuthServiceError> {
        self.secrets
            .revoke_all_for(SecretKind::RememberMe, &account.to_string())
            .await
    }
}

// ── AutoLogin ─────────────────────────────────────────────────────────────────

pub struct AutoLoginInput {
    pub bearer: String,
    pub previous_session_id: Option<String>,
    pub origin: ClientOrigin,
}

pub struct AutoLoginUseCase<Ac, R, S, A>
where
    Ac: AccountLookup,
    R: SecretRepository,
    S: SessionStore,
    A: AuditRepository,
{
    pub accounts: Ac,
    pub remember_me: RememberMeService<R, A>,
    pub sessions: SessionEstablisher<S, A>,
    pub audit: AuditLog<A>,
    pub external_timeout: StdDuration,
}

impl<Ac, R, S, A> AutoLoginUseCase<Ac, R, S, A>
where
    Ac: AccountLookup,
    R: SecretRepository,
    S: SessionStore,
    A: AuditRepository,
{
    pub async fn execute(&self, input: AutoLoginInput) -> Result<SessionHandle, AuthServiceError> {
        let account_id = self
            .remember_me
            .validate(&input.bearer, &input.origin)
            .await?;

        let account = bounded(
            self.external_timeout,
            "account lookup",
            self.accounts.find_by_id(account_id),
        )
        .await?;

        if account.is_none() {
            // The account is gone; none of its remember-me secrets are useful.
            self.remember_me.revoke_all_for(account_id).await?;
            self.audit
                .record(
                    AuditEvent::new(EventType::RememberMeInvalid, Outcome::Failed)
                        .with_subject(account_id)
                        .with_origin(&input.origin)
                        .with_detail("reason", "account_missing"),
                )
                .await;
            return Err(AuthServiceError::AccountMissing);
        }

        let handle = self
            .sessions
            .establish(
                account_id,
                &input.origin,
                input.previous_session_id.as_deref(),
            )
            .await?;

        self.audit
            .record(
                AuditEvent::new(EventType::RememberMeLogin, Outcome::Success)
                    .with_subject(account_id)
                    .with_origin(&input.origin),
            )
            .await;

        Ok(handle)
    }
}

/// Failures that mean the presented cookie is dead and should be cleared.
pub fn should_clear_cookie(err: &AuthServiceError) -> bool {
    matches!(
        err,
        AuthServiceError::Credential(_) | AuthServiceError::AccountMissing
    )
}
