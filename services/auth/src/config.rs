use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Deserialize;

use latchkey_core::config::Config;

use crate::domain::types::{
    DEFAULT_MAGIC_LINK_TTL_MINUTES, DEFAULT_MAX_ATTEMPTS_PER_EMAIL, DEFAULT_MAX_ATTEMPTS_PER_IP,
    DEFAULT_RATE_LIMIT_WINDOW_MINUTES, DEFAULT_REMEMBER_ME_TTL_DAYS, DEFAULT_SESSION_TTL_HOURS,
    MagicLinkPolicy, RateLimitPolicy, RememberMePolicy, SessionPolicy,
};

/// Auth service configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL (rate limits and sessions).
    pub redis_url: String,
    /// Origin login links are built on, e.g. "https://admin.example.org".
    pub public_base_url: String,
    /// Cookie domain attribute.
    pub cookie_domain: String,
    /// TCP port to listen on. Env var: `AUTH_PORT`.
    #[serde(default = "default_auth_port")]
    pub auth_port: u16,
    /// Reverse proxies in front of the service that append to
    /// `x-forwarded-for`. Zero means clients connect directly.
    #[serde(default)]
    pub trusted_proxy_hops: usize,

    #[serde(default = "default_magic_link_ttl_minutes")]
    pub magic_link_ttl_minutes: i64,
    #[serde(default = "default_remember_me_ttl_days")]
    pub remember_me_ttl_days: i64,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    #[serde(default = "default_max_attempts_per_email")]
    pub rate_limit_max_attempts_per_email: u32,
    #[serde(default = "default_max_attempts_per_ip")]
    pub rate_limit_max_attempts_per_ip: u32,
    #[serde(default = "default_rate_limit_window_minutes")]
    pub rate_limit_window_minutes: i64,

    /// Minimum duration of every well-formed issuance request. Must cover
    /// `external_timeout_secs` so a slow mail relay stays hidden.
    #[serde(default = "default_response_floor_ms")]
    pub response_floor_ms: u64,
    /// Bound on account lookups and mail delivery.
    #[serde(default = "default_external_timeout_secs")]
    pub external_timeout_secs: u64,
    /// Period of the expired-secret purge.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Transactional mail API endpoint.
    pub mail_api_url: String,
    pub mail_api_key: String,
    /// Sender address on every outgoing message.
    pub mail_from: String,
}

fn default_auth_port() -> u16 {
    3120
}

fn default_magic_link_ttl_minutes() -> i64 {
    DEFAULT_MAGIC_LINK_TTL_MINUTES
}

fn default_remember_me_ttl_days() -> i64 {
    DEFAULT_REMEMBER_ME_TTL_DAYS
}

fn default_session_ttl_hours() -> i64 {
    DEFAULT_SESSION_TTL_HOURS
}

fn default_max_attempts_per_email() -> u32 {
    DEFAULT_MAX_ATTEMPTS_PER_EMAIL
}

fn default_max_attempts_per_ip() -> u32 {
    DEFAULT_MAX_ATTEMPTS_PER_IP
}

fn default_rate_limit_window_minutes() -> i64 {
    DEFAULT_RATE_LIMIT_WINDOW_MINUTES
}

fn default_response_floor_ms() -> u64 {
    3000
}

fn default_external_timeout_secs() -> u64 {
    3
}

fn default_purge_interval_secs() -> u64 {
    3600
}

impl Config for AuthConfig {}

impl AuthConfig {
    /// Reject combinations that would weaken the login flow.
    pub fn check(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            StdDuration::from_millis(self.response_floor_ms) >= self.external_timeout(),
            "RESPONSE_FLOOR_MS ({}) must be at least EXTERNAL_TIMEOUT_SECS ({}s); \
             a mail delivery slower than the floor reveals which emails are registered",
            self.response_floor_ms,
            self.external_timeout_secs
        );
        anyhow::ensure!(
            self.external_timeout_secs > 0,
            "EXTERNAL_TIMEOUT_SECS must be positive"
        );
        Ok(())
    }

    pub fn external_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.external_timeout_secs)
    }

    pub fn purge_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.purge_interval_secs)
    }

    pub fn magic_link_policy(&self) -> MagicLinkPolicy {
        MagicLinkPolicy {
            ttl: Duration::minutes(self.magic_link_ttl_minutes),
            public_base_url: self.public_base_url.clone(),
            response_floor: StdDuration::from_millis(self.response_floor_ms),
            external_timeout: self.external_timeout(),
        }
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_attempts_per_email: self.rate_limit_max_attempts_per_email,
            max_attempts_per_ip: self.rate_limit_max_attempts_per_ip,
            window: Duration::minutes(self.rate_limit_window_minutes),
        }
    }

    pub fn remember_me_policy(&self) -> RememberMePolicy {
        RememberMePolicy {
            ttl: Duration::days(self.remember_me_ttl_days),
        }
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            ttl: Duration::hours(self.session_ttl_hours),
        }
    }
}
