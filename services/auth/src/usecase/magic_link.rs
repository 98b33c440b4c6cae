use std::time::Duration as StdDuration;

use chrono::Utc;
use subtle::ConstantTimeEq;
use tokio::time::Instant;
use url::Url;

use latchkey_auth_types::origin::ClientOrigin;
use latchkey_domain::email::EmailAddress;

use crate::domain::repository::{
    AccountLookup, AuditRepository, EmailSender, RateLimitStore, SecretRepository, SessionStore,
};
use crate::domain::types::{
    AdminAccount, AuditEvent, EventType, IssuedSecret, MagicLinkPolicy, Outcome, SecretKind,
    Session, SessionHandle,
};
use crate::error::AuthServiceError;
use crate::usecase::audit::AuditLog;
use crate::usecase::bounded;
use crate::usecase::mail::{login_notification_message, magic_link_message};
use crate::usecase::rate_limit::{RateDecision, RateLimiter};
use crate::usecase::remember_me::RememberMeService;
use crate::usecase::secret::SecretStore;
use crate::usecase::session::SessionEstablisher;

/// Path of the verification landing page and form target.
pub const VERIFY_PATH: &str = "/admin/verify-magic-link";

/// Build `{base}/admin/verify-magic-link?token=...[&remember=1]`.
pub fn login_url(base: &str, bearer: &str, remember_me: bool) -> Result<String, AuthServiceError> {
    let mut url = Url::parse(base)
        .and_then(|base| base.join(VERIFY_PATH))
        .map_err(|e| AuthServiceError::Internal(anyhow::anyhow!("invalid public base url: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("token", bearer);
        if remember_me {
            query.append_pair("remember", "1");
        }
    }
    Ok(url.into())
}

// ── RequestMagicLink ──────────────────────────────────────────────────────────

pub struct RequestMagicLinkInput {
    pub email: String,
    pub remember_me: bool,
    pub origin: ClientOrigin,
}

pub struct RequestMagicLinkUseCase<Ac, R, L, A, E>
where
    Ac: AccountLookup,
    R: SecretRepository,
    L: RateLimitStore,
    A: AuditRepository,
    E: EmailSender,
{
    pub accounts: Ac,
    pub secrets: SecretStore<R>,
    pub limiter: RateLimiter<L>,
    pub audit: AuditLog<A>,
    pub mailer: E,
    pub policy: MagicLinkPolicy,
}

impl<Ac, R, L, A, E> RequestMagicLinkUseCase<Ac, R, L, A, E>
where
    Ac: AccountLookup,
    R: SecretRepository,
    L: RateLimitStore,
    A: AuditRepository,
    E: EmailSender,
{
    /// `Ok(())` covers registered, unregistered and rate-limited requests
    /// alike. Every outcome after the syntax check takes at least
    /// `policy.response_floor`.
    pub async fn execute(&self, input: RequestMagicLinkInput) -> Result<(), AuthServiceError> {
        let email = match EmailAddress::parse(&input.email) {
            Ok(email) => email,
            Err(e) => {
                self.audit
                    .record(
                        AuditEvent::new(EventType::InvalidRequest, Outcome::Failed)
                            .with_origin(&input.origin)
                            .with_detail("reason", e.to_string()),
                    )
                    .await;
                return Err(AuthServiceError::InvalidRequest);
            }
        };

        let started = Instant::now();
        let result = self.process(&email, input.remember_me, &input.origin).await;
        tokio::time::sleep_until(started + self.policy.response_floor).await;
        result
    }

    async fn process(
        &self,
        email: &EmailAddress,
        remember_me: bool,
        origin: &ClientOrigin,
    ) -> Result<(), AuthServiceError> {
        if let RateDecision::Blocked(scope) = self.limiter.check_and_record(email, &origin.ip).await
        {
            self.audit
                .record(
                    AuditEvent::new(EventType::RateLimitExceeded, Outcome::Blocked)
                        .with_origin(origin)
                        .with_detail("email", email.as_str())
                        .with_detail("scope", scope.as_str()),
                )
                .await;
            return Ok(());
        }

        let account = bounded(
            self.policy.external_timeout,
            "account lookup",
            self.accounts.find_by_email(email),
        )
        .await?;

        let Some(account) = account else {
            self.secrets.decoy();
            self.audit
                .record(
                    AuditEvent::new(
                        EventType::MagicLinkRequestedNonexistentEmail,
                        Outcome::Failed,
                    )
                    .with_origin(origin)
                    .with_detail("email", email.as_str()),
                )
                .await;
            return Ok(());
        };

        let superseded = self
            .secrets
            .revoke_all_for(SecretKind::MagicLink, email.as_str())
            .await?;
        let issued = self
            .secrets
            .issue(
                SecretKind::MagicLink,
                email.as_str(),
                self.policy.ttl,
                Some(origin),
            )
            .await?;

        let url = login_url(&self.policy.public_base_url, &issued.bearer, remember_me)?;
        let message = magic_link_message(&account, &url, self.policy.ttl.num_minutes());

        if let Err(e) = bounded(
            self.policy.external_timeout,
            "magic link delivery",
            self.mailer.send(&message),
        )
        .await
        {
            tracing::error!(error = %e, account_id = %account.id, "magic link delivery failed");
            // The link never reached the user; it must not stay redeemable.
            if let Err(revoke_err) = self
                .secrets
                .revoke(SecretKind::MagicLink, &issued.bearer)
                .await
            {
                tracing::warn!(
                    error = %revoke_err,
                    secret_id = %issued.id,
                    "could not revoke undelivered magic link"
                );
            }
            self.audit
                .record(
                    AuditEvent::new(EventType::MagicLinkEmailFailed, Outcome::Failed)
                        .with_subject(account.id)
                        .with_origin(origin)
                        .with_detail("error", e.to_string()),
                )
                .await;
            return Err(e);
        }

        self.audit
            .record(
                AuditEvent::new(EventType::MagicLinkSent, Outcome::Success)
                    .with_subject(account.id)
                    .with_origin(origin)
                    .with_detail("secret_id", issued.id.to_string())
                    .with_detail("superseded", superseded)
                    .with_detail("remember_me", remember_me),
            )
            .await;
        Ok(())
    }
}

// ── VerifyMagicLink ───────────────────────────────────────────────────────────

pub struct VerifyMagicLinkInput {
    pub bearer: String,
    pub csrf_token: String,
    /// The session named by the request cookie, if it still exists.
    pub session: Option<Session>,
    pub remember_me: bool,
    pub origin: ClientOrigin,
}

#[derive(Debug)]
pub struct VerifyMagicLinkOutput {
    pub account: AdminAccount,
    pub session: SessionHandle,
    pub remember_me: Option<IssuedSecret>,
}

pub struct VerifyMagicLinkUseCase<Ac, R, S, A, E>
where
    Ac: AccountLookup,
    R: SecretRepository,
    S: SessionStore,
    A: AuditRepository,
    E: EmailSender + Clone + 'static,
{
    pub accounts: Ac,
    pub secrets: SecretStore<R>,
    pub sessions: SessionEstablisher<S, A>,
    pub remember_me: RememberMeService<R, A>,
    pub audit: AuditLog<A>,
    pub mailer: E,
    pub external_timeout: StdDuration,
}

impl<Ac, R, S, A, E> VerifyMagicLinkUseCase<Ac, R, S, A, E>
where
    Ac: AccountLookup,
    R: SecretRepository,
    S: SessionStore,
    A: AuditRepository,
    E: EmailSender + Clone + 'static,
{
    pub async fn execute(
        &self,
        input: VerifyMagicLinkInput,
    ) -> Result<VerifyMagicLinkOutput, AuthServiceError> {
        // CSRF first: a mismatch never reaches the secret store.
        let csrf_ok = input.session.as_ref().is_some_and(|session| {
            bool::from(
                session
                    .csrf_token
                    .as_bytes()
                    .ct_eq(input.csrf_token.as_bytes()),
            )
        });
        if !csrf_ok {
            self.audit
                .record(
                    AuditEvent::new(EventType::CsrfFailure, Outcome::Blocked)
                        .with_origin(&input.origin)
                        .with_detail("has_session", input.session.is_some()),
                )
                .await;
            return Err(AuthServiceError::CsrfMismatch);
        }

        let secret = match self
            .secrets
            .validate_and_consume(SecretKind::MagicLink, &input.bearer)
            .await
        {
            Ok(secret) => secret,
            Err(AuthServiceError::Credential(reason)) => {
                self.audit
                    .record(
                        AuditEvent::new(EventType::MagicLinkInvalid, Outcome::Failed)
                            .with_origin(&input.origin)
                            .with_detail("reason", reason.reason()),
                    )
                    .await;
                return Err(reason.into());
            }
            Err(e) => return Err(e),
        };

        let email = EmailAddress::parse(&secret.subject).map_err(|e| {
            AuthServiceError::Internal(anyhow::anyhow!(
                "magic link secret {} has an unusable subject: {e}",
                secret.id
            ))
        })?;
        let account = bounded(
            self.external_timeout,
            "account lookup",
            self.accounts.find_by_email(&email),
        )
        .await?;
        let Some(account) = account else {
            self.audit
                .record(
                    AuditEvent::new(EventType::MagicLinkNoAdminAccount, Outcome::Failed)
                        .with_origin(&input.origin)
                        .with_detail("email", email.as_str()),
                )
                .await;
            return Err(AuthServiceError::AccountMissing);
        };

        let previous = input.session.as_ref().map(|s| s.id.as_str());
        let session = self
            .sessions
            .establish(account.id, &input.origin, previous)
            .await?;

        self.audit
            .record(
                AuditEvent::new(EventType::AdminLoginSuccess, Outcome::Success)
                    .with_subject(account.id)
                    .with_origin(&input.origin)
                    .with_detail("method", "magic_link")
                    .with_detail("secret_id", secret.id.to_string()),
            )
            .await;

        let remember_me = if input.remember_me {
            match self.remember_me.issue(account.id, &input.origin).await {
                Ok(issued) => Some(issued),
                Err(e) => {
                    tracing::warn!(error = %e, account_id = %account.id, "remember-me issuance failed");
                    None
                }
            }
        } else {
            None
        };

        self.notify_login(&account, &input.origin);

        Ok(VerifyMagicLinkOutput {
            account,
            session,
            remember_me,
        })
    }

    /// Best-effort notification on a detached task.
    fn notify_login(&self, account: &AdminAccount, origin: &ClientOrigin) {
        let message = login_notification_message(
            account,
            Utc::now(),
            &origin.ip,
            origin.user_agent.as_deref(),
        );
        let mailer = self.mailer.clone();
        let limit = self.external_timeout;
        let account_id = account.id;
        tokio::spawn(async move {
            if let Err(e) = bounded(limit, "login notification", mailer.send(&message)).await {
                tracing::warn!(error = %e, %account_id, "login notification failed");
            }
        });
    }
}
