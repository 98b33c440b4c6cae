use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use latchkey_auth_types::origin::ClientOrigin;
use latchkey_domain::email::EmailAddress;
use latchkey_domain::id::{AdminAccountId, SecretId};

/// Admin account data resolved through the account lookup collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub id: AdminAccountId,
    pub email: EmailAddress,
    pub username: String,
    pub display_name: String,
}

// ── Secrets ───────────────────────────────────────────────────────────────────

/// Whether a successful validation ends a secret's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumptionPolicy {
    SingleUse,
    MultiUse,
}

/// The two credential kinds backed by the secret table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    MagicLink,
    RememberMe,
}

impl SecretKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MagicLink => "magic_link",
            Self::RememberMe => "remember_me",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "magic_link" => Some(Self::MagicLink),
            "remember_me" => Some(Self::RememberMe),
            _ => None,
        }
    }

    pub fn policy(&self) -> ConsumptionPolicy {
        match self {
            Self::MagicLink => ConsumptionPolicy::SingleUse,
            Self::RememberMe => ConsumptionPolicy::MultiUse,
        }
    }
}

/// Stored secret. `secret_hash` is the hex SHA-256 of the bearer value; the
/// bearer value itself is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub id: SecretId,
    pub kind: SecretKind,
    pub secret_hash: String,
    /// Normalized email for magic links, account id for remember-me.
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Secret {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Valid means unexpired, unrevoked and, for single-use kinds, unconsumed.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let unused = match self.kind.policy() {
            ConsumptionPolicy::SingleUse => self.consumed_at.is_none(),
            ConsumptionPolicy::MultiUse => true,
        };
        unused && self.revoked_at.is_none() && !self.is_expired_at(now)
    }
}

/// Returned once from issuance. The bearer value cannot be recovered later.
#[derive(Clone)]
pub struct IssuedSecret {
    pub id: SecretId,
    pub bearer: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedSecret")
            .field("id", &self.id)
            .field("bearer", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ── Audit ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    InvalidRequest,
    RateLimitExceeded,
    MagicLinkSent,
    MagicLinkEmailFailed,
    MagicLinkRequestedNonexistentEmail,
    CsrfFailure,
    MagicLinkInvalid,
    MagicLinkNoAdminAccount,
    AdminLoginSuccess,
    SessionCreated,
    RememberMeIssued,
    RememberMeLogin,
    RememberMeInvalid,
    RememberMeRevoked,
    Logout,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::MagicLinkSent => "magic_link_sent",
            Self::MagicLinkEmailFailed => "magic_link_email_failed",
            Self::MagicLinkRequestedNonexistentEmail => "magic_link_requested_nonexistent_email",
            Self::CsrfFailure => "csrf_failure",
            Self::MagicLinkInvalid => "magic_link_invalid",
            Self::MagicLinkNoAdminAccount => "magic_link_no_admin_account",
            Self::AdminLoginSuccess => "admin_login_success",
            Self::SessionCreated => "session_created",
            Self::RememberMeIssued => "remember_me_issued",
            Self::RememberMeLogin => "remember_me_login",
            Self::RememberMeInvalid => "remember_me_invalid",
            Self::RememberMeRevoked => "remember_me_revoked",
            Self::Logout => "logout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    Blocked,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }
}

/// Immutable security event.
///
/// ```
/// use latchkey_auth::domain::types::{AuditEvent, EventType, Outcome};
///
/// let event = AuditEvent::new(EventType::RateLimitExceeded, Outcome::Blocked)
///     .with_ip("203.0.113.7")
///     .with_detail("email", "admin@example.org");
/// assert_eq!(event.metadata["email"], "admin@example.org");
/// assert!(event.subject_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub subject_id: Option<AdminAccountId>,
    pub event_type: EventType,
    pub outcome: Outcome,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: EventType, outcome: Outcome) -> Self {
        Self {
            id: Uuid::now_v7(),
            subject_id: None,
            event_type,
            outcome,
            ip_address: None,
            user_agent: None,
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_subject(mut self, subject: AdminAccountId) -> Self {
        self.subject_id = Some(subject);
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_origin(mut self, origin: &ClientOrigin) -> Self {
        self.ip_address = Some(origin.ip.clone());
        self.user_agent = origin.user_agent.clone();
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────────

/// Server-side session record, created anonymous (CSRF only) and upgraded by
/// replacement when a credential is proven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub csrf_token: String,
    pub admin_account_id: Option<AdminAccountId>,
    pub login_time: Option<DateTime<Utc>>,
    pub login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.admin_account_id.is_some()
    }
}

/// What the web layer needs after a login: the cookie value and who it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub admin_account_id: AdminAccountId,
    pub login_time: DateTime<Utc>,
    pub csrf_token: String,
}

// ── Mail ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

// ── Policies ──────────────────────────────────────────────────────────────────

/// Defaults used when config leaves a value unset.
pub const DEFAULT_MAGIC_LINK_TTL_MINUTES: i64 = 5;
pub const DEFAULT_REMEMBER_ME_TTL_DAYS: i64 = 30;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;
pub const DEFAULT_MAX_ATTEMPTS_PER_EMAIL: u32 = 5;
pub const DEFAULT_MAX_ATTEMPTS_PER_IP: u32 = 20;
pub const DEFAULT_RATE_LIMIT_WINDOW_MINUTES: i64 = 15;

/// Random bytes in every bearer value, session id and CSRF token (256 bits).
pub const SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct MagicLinkPolicy {
    pub ttl: Duration,
    /// Origin the login URL is built on, e.g. `https://admin.example.org`.
    pub public_base_url: String,
    /// Minimum wall time of every well-formed issuance request.
    pub response_floor: std::time::Duration,
    /// Bound on account lookups and mail delivery.
    pub external_timeout: std::time::Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_attempts_per_email: u32,
    pub max_attempts_per_ip: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_email: DEFAULT_MAX_ATTEMPTS_PER_EMAIL,
            max_attempts_per_ip: DEFAULT_MAX_ATTEMPTS_PER_IP,
            window: Duration::minutes(DEFAULT_RATE_LIMIT_WINDOW_MINUTES),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RememberMePolicy {
    pub ttl: Duration,
}

impl Default for RememberMePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::days(DEFAULT_REMEMBER_ME_TTL_DAYS),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub ttl: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }
}
