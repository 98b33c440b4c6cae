use std::future::Future;
use std::sync::Arc;

use axum::extract::FromRef;
use deadpool_redis::Pool as RedisPool;
use sea_orm::DatabaseConnection;

use latchkey_auth_types::origin::ProxyPolicy;

use crate::config::AuthConfig;
use crate::domain::repository::{
    AccountLookup, AuditRepository, EmailSender, RateLimitStore, SecretRepository, SessionStore,
};
use crate::infra::cache::{self, RedisRateLimitStore, RedisSessionStore};
use crate::infra::db::{DbAccountLookup, DbAuditRepository, DbSecretRepository};
use crate::infra::email::HttpEmailSender;
use crate::usecase::audit::AuditLog;
use crate::usecase::magic_link::{RequestMagicLinkUseCase, VerifyMagicLinkUseCase};
use crate::usecase::rate_limit::RateLimiter;
use crate::usecase::remember_me::{AutoLoginUseCase, RememberMeService};
use crate::usecase::secret::SecretStore;
use crate::usecase::session::{LogoutUseCase, SessionEstablisher};

/// The set of adapters one deployment runs on.
///
/// Each accessor hands out a cheap clone over shared connections, so use cases
/// can be built per request.
pub trait AuthBackend: Clone + Send + Sync + 'static {
    type Accounts: AccountLookup + Clone + 'static;
    type Secrets: SecretRepository + Clone + 'static;
    type RateLimits: RateLimitStore + Clone + 'static;
    type Audit: AuditRepository + Clone + 'static;
    type Sessions: SessionStore + Clone + 'static;
    type Mailer: EmailSender + Clone + 'static;

    fn accounts(&self) -> Self::Accounts;
    fn secrets(&self) -> Self::Secrets;
    fn rate_limits(&self) -> Self::RateLimits;
    fn audit(&self) -> Self::Audit;
    fn sessions(&self) -> Self::Sessions;
    fn mailer(&self) -> Self::Mailer;

    /// Named dependency checks reported by `/readyz`.
    fn readiness(&self) -> impl Future<Output = Vec<(&'static str, bool)>> + Send;
}

/// Postgres for secrets, accounts and audit; Redis for rate limits and
/// sessions; the HTTP mail API for delivery.
#[derive(Clone)]
pub struct LiveBackend {
    pub db: DatabaseConnection,
    pub redis: RedisPool,
    pub mailer: HttpEmailSender,
}

impl LiveBackend {
    pub fn new(
        db: DatabaseConnection,
        redis: RedisPool,
        http: reqwest::Client,
        config: &AuthConfig,
    ) -> Self {
        Self {
            db,
            redis,
            mailer: HttpEmailSender {
                client: http,
                api_url: config.mail_api_url.clone(),
                api_key: config.mail_api_key.clone(),
                from: config.mail_from.clone(),
                timeout: config.external_timeout(),
            },
        }
    }
}

impl AuthBackend for LiveBackend {
    type Accounts = DbAccountLookup;
    type Secrets = DbSecretRepository;
    type RateLimits = RedisRateLimitStore;
    type Audit = DbAuditRepository;
    type Sessions = RedisSessionStore;
    type Mailer = HttpEmailSender;

    fn accounts(&self) -> DbAccountLookup {
        DbAccountLookup {
            db: self.db.clone(),
        }
    }

    fn secrets(&self) -> DbSecretRepository {
        DbSecretRepository {
            db: self.db.clone(),
        }
    }

    fn rate_limits(&self) -> RedisRateLimitStore {
        RedisRateLimitStore {
            pool: self.redis.clone(),
        }
    }

    fn audit(&self) -> DbAuditRepository {
        DbAuditRepository {
            db: self.db.clone(),
        }
    }

    fn sessions(&self) -> RedisSessionStore {
        RedisSessionStore {
            pool: self.redis.clone(),
        }
    }

    fn mailer(&self) -> HttpEmailSender {
        self.mailer.clone()
    }

    async fn readiness(&self) -> Vec<(&'static str, bool)> {
        let database = self.db.ping().await.is_ok();
        let redis = cache::ping(&self.redis).await;
        vec![("database", database), ("redis", redis)]
    }
}

pub type Sessions<B> =
    SessionEstablisher<<B as AuthBackend>::Sessions, <B as AuthBackend>::Audit>;
pub type RememberMe<B> =
    RememberMeService<<B as AuthBackend>::Secrets, <B as AuthBackend>::Audit>;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState<B: AuthBackend = LiveBackend> {
    pub backend: B,
    pub config: Arc<AuthConfig>,
}

impl<B: AuthBackend> FromRef<AppState<B>> for ProxyPolicy {
    fn from_ref(state: &AppState<B>) -> Self {
        ProxyPolicy::new(state.config.trusted_proxy_hops)
    }
}

impl<B: AuthBackend> AppState<B> {
    pub fn new(backend: B, config: AuthConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }

    pub fn cookie_domain(&self) -> String {
        self.config.cookie_domain.clone()
    }

    pub fn secret_store(&self) -> SecretStore<B::Secrets> {
        SecretStore::new(self.backend.secrets())
    }

    pub fn audit_log(&self) -> AuditLog<B::Audit> {
        AuditLog::new(self.backend.audit())
    }

    pub fn rate_limiter(&self) -> RateLimiter<B::RateLimits> {
        RateLimiter::new(self.backend.rate_limits(), self.config.rate_limit_policy())
    }

    pub fn sessions(&self) -> Sessions<B> {
        SessionEstablisher {
            store: self.backend.sessions(),
            audit: self.audit_log(),
            policy: self.config.session_policy(),
        }
    }

    pub fn remember_me(&self) -> RememberMe<B> {
        RememberMeService {
            secrets: self.secret_store(),
            audit: self.audit_log(),
            policy: self.config.remember_me_policy(),
        }
    }

    pub fn request_magic_link(
        &self,
    ) -> RequestMagicLinkUseCase<B::Accounts, B::Secrets, B::RateLimits, B::Audit, B::Mailer> {
        RequestMagicLinkUseCase {
            accounts: self.backend.accounts(),
            secrets: self.secret_store(),
            limiter: self.rate_limiter(),
            audit: self.audit_log(),
            mailer: self.backend.mailer(),
            policy: self.config.magic_link_policy(),
        }
    }

    pub fn verify_magic_link(
        &self,
    ) -> VerifyMagicLinkUseCase<B::Accounts, B::Secrets, B::Sessions, B::Audit, B::Mailer> {
        VerifyMagicLinkUseCase {
            accounts: self.backend.accounts(),
            secrets: self.secret_store(),
            sessions: self.sessions(),
            remember_me: self.remember_me(),
            audit: self.audit_log(),
            mailer: self.backend.mailer(),
            external_timeout: self.config.external_timeout(),
        }
    }

    pub fn auto_login(&self) -> AutoLoginUseCase<B::Accounts, B::Secrets, B::Sessions, B::Audit> {
        AutoLoginUseCase {
            accounts: self.backend.accounts(),
            remember_me: self.remember_me(),
            sessions: self.sessions(),
            audit: self.audit_log(),
            external_timeout: self.config.external_timeout(),
        }
    }

    pub fn logout(&self) -> LogoutUseCase<B::Secrets, B::Sessions, B::Audit> {
        LogoutUseCase {
            sessions: self.sessions(),
            remember_me: self.remember_me(),
            audit: self.audit_log(),
        }
    }
}
