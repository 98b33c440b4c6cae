use std::future::{Future, ready};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use url::Url;
use uuid::Uuid;

use latchkey_auth::config::AuthConfig;
use latchkey_auth::domain::repository::{
    AccountLookup, AuditRepository, EmailSender, RateLimitStore,
};
use latchkey_auth::domain::types::{
    AdminAccount, AuditEvent, EmailMessage, MagicLinkPolicy, RateLimitPolicy, RememberMePolicy,
    SessionPolicy,
};
use latchkey_auth::error::AuthServiceError;
use latchkey_auth::infra::memory::{
    InMemoryAuditRepository, InMemoryRateLimitStore, InMemorySecretRepository,
    InMemorySessionStore,
};
use latchkey_auth::router::build_router;
use latchkey_auth::state::{AppState, AuthBackend};
use latchkey_auth::usecase::audit::AuditLog;
use latchkey_auth::usecase::magic_link::{RequestMagicLinkUseCase, VerifyMagicLinkUseCase};
use latchkey_auth::usecase::rate_limit::RateLimiter;
use latchkey_auth::usecase::remember_me::{AutoLoginUseCase, RememberMeService};
use latchkey_auth::usecase::secret::SecretStore;
use latchkey_auth::usecase::session::{LogoutUseCase, SessionEstablisher};
use latchkey_auth_types::origin::ClientOrigin;
use latchkey_core::config::Config;
use latchkey_domain::email::EmailAddress;
use latchkey_domain::id::AdminAccountId;

pub const ADMIN_EMAIL: &str = "admin@example.org";
pub const BASE_URL: &str = "https://admin.example.org";
pub const RESPONSE_FLOOR: StdDuration = StdDuration::from_millis(400);
pub const EXTERNAL_TIMEOUT: StdDuration = StdDuration::from_secs(5);

// ── FakeAccounts ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct FakeAccounts {
    pub accounts: Arc<Mutex<Vec<AdminAccount>>>,
}

impl FakeAccounts {
    pub fn new(accounts: Vec<AdminAccount>) -> Self {
        Self {
            accounts: Arc::new(Mutex::new(accounts)),
        }
    }

    /// Simulates the surrounding application deleting an account.
    pub fn remove(&self, id: AdminAccountId) {
        self.accounts.lock().unwrap().retain(|a| a.id != id);
    }
}

impl AccountLookup for FakeAccounts {
    async fn find_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<AdminAccount>, AuthServiceError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| &a.email == email)
            .cloned())
    }

    async fn find_by_id(
        &self,
        id: AdminAccountId,
    ) -> Result<Option<AdminAccount>, AuthServiceError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }
}

/// Account store that never answers.
#[derive(Clone)]
pub struct HangingAccounts;

impl AccountLookup for HangingAccounts {
    async fn find_by_email(
        &self,
        _email: &EmailAddress,
    ) -> Result<Option<AdminAccount>, AuthServiceError> {
        std::future::pending().await
    }

    async fn find_by_id(
        &self,
        _id: AdminAccountId,
    ) -> Result<Option<AdminAccount>, AuthServiceError> {
        std::future::pending().await
    }
}

// ── RecordingMailer ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Bearer value and remember flag from the most recent login link.
    pub fn last_link(&self) -> (String, bool) {
        let sent = self.sent();
        let message = sent
            .iter()
            .rev()
            .find(|m| m.subject == "Your admin login link")
            .expect("no login link was sent");
        link_from_message(message)
    }
}

impl EmailSender for RecordingMailer {
    fn send(
        &self,
        message: &EmailMessage,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send {
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(AuthServiceError::dependency(anyhow::anyhow!(
                "mail relay refused connection"
            )))
        } else {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        };
        ready(result)
    }
}

pub fn link_from_message(message: &EmailMessage) -> (String, bool) {
    let line = message
        .text_body
        .lines()
        .find(|l| l.starts_with(BASE_URL))
        .expect("message carries no login url");
    let url = Url::parse(line).unwrap();
    assert_eq!(url.path(), "/admin/verify-magic-link");
    let token = url
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .expect("login url has no token");
    let remember = url.query_pairs().any(|(k, v)| k == "remember" && v == "1");
    (token, remember)
}

// ── Failing stores ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct FailingAuditRepository;

impl AuditRepository for FailingAuditRepository {
    async fn append(&self, _event: &AuditEvent) -> Result<(), AuthServiceError> {
        Err(AuthServiceError::Internal(anyhow::anyhow!(
            "audit table unavailable"
        )))
    }
}

#[derive(Clone)]
pub struct FailingRateLimitStore;

impl RateLimitStore for FailingRateLimitStore {
    async fn record_attempt(
        &self,
        _key: &str,
        _limit: u32,
        _window: Duration,
        _now: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        Err(AuthServiceError::Internal(anyhow::anyhow!("redis down")))
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn test_account() -> AdminAccount {
    AdminAccount {
        id: AdminAccountId(Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap()),
        email: EmailAddress::parse(ADMIN_EMAIL).unwrap(),
        username: "admin".to_owned(),
        display_name: "Site Admin".to_owned(),
    }
}

pub fn origin() -> ClientOrigin {
    ClientOrigin::new(
        "203.0.113.7",
        Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0".to_owned()),
    )
}

pub fn magic_link_policy() -> MagicLinkPolicy {
    MagicLinkPolicy {
        ttl: Duration::minutes(5),
        public_base_url: BASE_URL.to_owned(),
        response_floor: RESPONSE_FLOOR,
        external_timeout: EXTERNAL_TIMEOUT,
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

/// Every use case wired against shared in-memory adapters. Each accessor
/// builds a fresh use case over the same underlying state.
#[derive(Clone)]
pub struct Harness {
    pub accounts: FakeAccounts,
    pub secrets: InMemorySecretRepository,
    pub limits: InMemoryRateLimitStore,
    pub audit: InMemoryAuditRepository,
    pub sessions: InMemorySessionStore,
    pub mailer: RecordingMailer,
    pub rate_limit: RateLimitPolicy,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            accounts: FakeAccounts::new(vec![test_account()]),
            secrets: InMemorySecretRepository::new(),
            limits: InMemoryRateLimitStore::new(),
            audit: InMemoryAuditRepository::new(),
            sessions: InMemorySessionStore::new(),
            mailer: RecordingMailer::new(),
            rate_limit: RateLimitPolicy::default(),
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitPolicy) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// The full HTTP surface over this harness's stores. `extra` overrides
    /// environment settings on top of a minimal valid configuration.
    pub fn app(&self, extra: &[(&str, &str)]) -> axum::Router {
        let base = [
            ("DATABASE_URL", "postgres://unused"),
            ("REDIS_URL", "redis://unused"),
            ("PUBLIC_BASE_URL", BASE_URL),
            ("COOKIE_DOMAIN", "admin.example.org"),
            ("MAIL_API_URL", "https://mail.example.org/send"),
            ("MAIL_API_KEY", "key"),
            ("MAIL_FROM", "noreply@example.org"),
        ];
        let pairs = base
            .iter()
            .chain(extra)
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()));
        let config = AuthConfig::from_pairs(pairs).unwrap();
        config.check().unwrap();
        build_router(AppState::new(self.clone(), config))
    }

    pub fn audit_log(&self) -> AuditLog<InMemoryAuditRepository> {
        AuditLog::new(self.audit.clone())
    }

    pub fn secret_store(&self) -> SecretStore<InMemorySecretRepository> {
        SecretStore::new(self.secrets.clone())
    }

    pub fn establisher(&self) -> SessionEstablisher<InMemorySessionStore, InMemoryAuditRepository> {
        SessionEstablisher {
            store: self.sessions.clone(),
            audit: self.audit_log(),
            policy: SessionPolicy::default(),
        }
    }

    pub fn remember_me(&self) -> RememberMeService<InMemorySecretRepository, InMemoryAuditRepository> {
        RememberMeService {
            secrets: self.secret_store(),
            audit: self.audit_log(),
            policy: RememberMePolicy::default(),
        }
    }

    pub fn request_link(
        &self,
    ) -> RequestMagicLinkUseCase<
        FakeAccounts,
        InMemorySecretRepository,
        InMemoryRateLimitStore,
        InMemoryAuditRepository,
        RecordingMailer,
    > {
        RequestMagicLinkUseCase {
            accounts: self.accounts.clone(),
            secrets: self.secret_store(),
            limiter: RateLimiter::new(self.limits.clone(), self.rate_limit),
            audit: self.audit_log(),
            mailer: self.mailer.clone(),
            policy: magic_link_policy(),
        }
    }

    pub fn verify_link(
        &self,
    ) -> VerifyMagicLinkUseCase<
        FakeAccounts,
        InMemorySecretRepository,
        InMemorySessionStore,
        InMemoryAuditRepository,
        RecordingMailer,
    > {
        VerifyMagicLinkUseCase {
            accounts: self.accounts.clone(),
            secrets: self.secret_store(),
            sessions: self.establisher(),
            remember_me: self.remember_me(),
            audit: self.audit_log(),
            mailer: self.mailer.clone(),
            external_timeout: EXTERNAL_TIMEOUT,
        }
    }

    pub fn auto_login(
        &self,
    ) -> AutoLoginUseCase<
        FakeAccounts,
        InMemorySecretRepository,
        InMemorySessionStore,
        InMemoryAuditRepository,
    > {
        AutoLoginUseCase {
            accounts: self.accounts.clone(),
            remember_me: self.remember_me(),
            sessions: self.establisher(),
            audit: self.audit_log(),
            external_timeout: EXTERNAL_TIMEOUT,
        }
    }

    pub fn logout(
        &self,
    ) -> LogoutUseCase<InMemorySecretRepository, InMemorySessionStore, InMemoryAuditRepository>
    {
        LogoutUseCase {
            sessions: self.establisher(),
            remember_me: self.remember_me(),
            audit: self.audit_log(),
        }
    }
}

impl AuthBackend for Harness {
    type Accounts = FakeAccounts;
    type Secrets = InMemorySecretRepository;
    type RateLimits = InMemoryRateLimitStore;
    type Audit = InMemoryAuditRepository;
    type Sessions = InMemorySessionStore;
    type Mailer = RecordingMailer;

    fn accounts(&self) -> FakeAccounts {
        self.accounts.clone()
    }

    fn secrets(&self) -> InMemorySecretRepository {
        self.secrets.clone()
    }

    fn rate_limits(&self) -> InMemoryRateLimitStore {
        self.limits.clone()
    }

    fn audit(&self) -> InMemoryAuditRepository {
        self.audit.clone()
    }

    fn sessions(&self) -> InMemorySessionStore {
        self.sessions.clone()
    }

    fn mailer(&self) -> RecordingMailer {
        self.mailer.clone()
    }

    async fn readiness(&self) -> Vec<(&'static str, bool)> {
        vec![("memory", true)]
    }
}
