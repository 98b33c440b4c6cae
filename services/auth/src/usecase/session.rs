use chrono::Utc;

use latchkey_auth_types::origin::ClientOrigin;
use latchkey_domain::id::AdminAccountId;

use crate::domain::repository::{AuditRepository, SecretRepository, SessionStore};
use crate::domain::types::{AuditEvent, EventType, Outcome, Session, SessionHandle, SessionPolicy};
use crate::error::AuthServiceError;
use crate::usecase::audit::AuditLog;
use crate::usecase::remember_me::RememberMeService;
use crate::usecase::secret::generate_bearer;

/// The one place where proof of a credential turns into an authenticated
/// session. Also serves the pre-auth (CSRF-only) session and logout.
#[derive(Clone)]
pub struct SessionEstablisher<S: SessionStore, A: AuditRepository> {
    pub store: S,
    pub audit: AuditLog<A>,
    pub policy: SessionPolicy,
}

impl<S: SessionStore, A: AuditRepository> SessionEstablisher<S, A> {
    /// Anonymous session carrying only a CSRF token.
    pub async fn start_anonymous(&self) -> Result<Session, AuthServiceError> {
        let session = Session {
            id: generate_bearer(),
            csrf_token: generate_bearer(),
            admin_account_id: None,
            login_time: None,
            login_ip: None,
            created_at: Utc::now(),
        };
        self.store.put(&session, self.policy.ttl).await?;
        Ok(session)
    }

    /// Reuse the session named by the cookie when it still exists, otherwise
    /// start a fresh anonymous one.
    pub async fn load_or_start(&self, id: Option<&str>) -> Result<Session, AuthServiceError> {
        if let Some(id) = id {
            if let Some(session) = self.store.get(id).await? {
                return Ok(session);
            }
        }
        self.start_anonymous().await
    }

    /// Any stored session, anonymous or not.
    pub async fn load(&self, id: &str) -> Result<Option<Session>, AuthServiceError> {
        self.store.get(id).await
    }

    /// Issue a brand-new session id for `account`. The previous session (if
    /// any) is destroyed, so an id planted before login is worthless after it.
    pub async fn establish(
        &self,
        account: AdminAccountId,
        origin: &ClientOrigin,
        previous_session_id: Option<&str>,
    ) -> Result<SessionHandle, AuthServiceError> {
        if let Some(previous) = previous_session_id {
            self.store.delete(previous).await?;
        }

        let now = Utc::now();
        let session = Session {
            id: generate_bearer(),
            csrf_token: generate_bearer(),
            admin_account_id: Some(account),
            login_time: Some(now),
            login_ip: Some(origin.ip.clone()),
            created_at: now,
        };
        self.store.put(&session, self.policy.ttl).await?;

        self.audit
            .record(
                AuditEvent::new(EventType::SessionCreated, Outcome::Success)
                    .with_subject(account)
                    .with_origin(origin),
            )
            .await;

        Ok(SessionHandle {
            session_id: session.id,
            admin_account_id: account,
            login_time: now,
            csrf_token: session.csrf_token,
        })
    }

    /// Authenticated session for `id`, or `None` for unknown, expired or
    /// anonymous sessions.
    pub async fn current(&self, id: &str) -> Result<Option<Session>, AuthServiceError> {
        Ok(self
            .store
            .get(id)
            .await?
            .filter(Session::is_authenticated))
    }

    pub async fn end(&self, id: &str) -> Result<(), AuthServiceError> {
        self.store.delete(id).await
    }
}

// ── Logout ────────────────────────────────────────────────────────────────────

pub struct LogoutInput {
    pub session_id: Option<String>,
    pub remember_me_bearer: Option<String>,
    pub origin: ClientOrigin,
}

/// Ends the session and revokes the presented remember-me secret. Both parts
/// are optional; logging out with neither is a no-op apart from the audit
/// record.
pub struct LogoutUseCase<R, S, A>
where
    R: SecretRepository,
    S: SessionStore,
    A: AuditRepository,
{
    pub sessions: SessionEstablisher<S, A>,
    pub remember_me: RememberMeService<R, A>,
    pub audit: AuditLog<A>,
}

impl<R, S, A> LogoutUseCase<R, S, A>
where
    R: SecretRepository,
    S: SessionStore,
    A: AuditRepository,
{
    pub async fn execute(&self, input: LogoutInput) -> Result<(), AuthServiceError> {
        let mut subject = None;
        if let Some(id) = input.session_id.as_deref() {
            subject = self
                .sessions
                .load(id)
                .await?
                .and_then(|s| s.admin_account_id);
            self.sessions.end(id).await?;
        }

        if let Some(bearer) = input.remember_me_bearer.as_deref() {
            self.remember_me
                .revoke(bearer, subject, &input.origin)
                .await?;
        }

        let mut event = AuditEvent::new(EventType::Logout, Outcome::Success).with_origin(&input.origin);
        if let Some(subject) = subject {
            event = event.with_subject(subject);
        }
        self.audit.record(event).await;
        Ok(())
    }
}
