use chrono::{DateTime, Utc};

use latchkey_domain::email::EmailAddress;

use crate::domain::repository::RateLimitStore;
use crate::domain::types::RateLimitPolicy;

/// Which sub-limit stopped a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    Email,
    Ip,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Ip => "ip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Blocked(RateLimitScope),
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

pub fn email_key(email: &EmailAddress) -> String {
    format!("magic_link:rl:email:{}", email.as_str())
}

pub fn ip_key(ip: &str) -> String {
    format!("magic_link:rl:ip:{ip}")
}

/// Two independent sliding-log counters per issuance request: one keyed by
/// normalized email, one by client IP.
#[derive(Clone)]
pub struct RateLimiter<S: RateLimitStore> {
    pub store: S,
    pub policy: RateLimitPolicy,
}

impl<S: RateLimitStore> RateLimiter<S> {
    pub fn new(store: S, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn check_and_record(&self, email: &EmailAddress, ip: &str) -> RateDecision {
        self.check_and_record_at(email, ip, Utc::now()).await
    }

    /// The email counter is checked first; when it blocks, the IP counter is
    /// left untouched.
    pub async fn check_and_record_at(
        &self,
        email: &EmailAddress,
        ip: &str,
        now: DateTime<Utc>,
    ) -> RateDecision {
        if !self
            .admit(&email_key(email), self.policy.max_attempts_per_email, now)
            .await
        {
            return RateDecision::Blocked(RateLimitScope::Email);
        }
        if !self
            .admit(&ip_key(ip), self.policy.max_attempts_per_ip, now)
            .await
        {
            return RateDecision::Blocked(RateLimitScope::Ip);
        }
        RateDecision::Allowed
    }

    async fn admit(&self, key: &str, limit: u32, now: DateTime<Utc>) -> bool {
        match self
            .store
            .record_attempt(key, limit, self.policy.window, now)
            .await
        {
            Ok(admitted) => admitted,
            Err(e) => {
                // Fail open: the credential check still guards login.
                tracing::warn!(error = %e, key, "rate limit store unavailable, admitting request");
                true
            }
        }
    }
}
