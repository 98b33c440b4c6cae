//! In-process adapters for single-instance deployments and tests.
//!
//! Each adapter is a cheap `Clone` over shared state, so a test can keep one
//! handle for inspection while the use case owns another. Locks are never held
//! across an `.await`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use latchkey_domain::id::SecretId;

use crate::domain::repository::{AuditRepository, RateLimitStore, SecretRepository, SessionStore};
use crate::domain::types::{AuditEvent, EventType, Secret, SecretKind, Session};
use crate::error::AuthServiceError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not wedge every other user of the store.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Secrets ───────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemorySecretRepository {
    secrets: Arc<Mutex<Vec<Secret>>>,
}

impl InMemorySecretRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row.
    pub fn snapshot(&self) -> Vec<Secret> {
        lock(&self.secrets).clone()
    }

    /// Overwrite `expires_at` on a stored row (tests use this to age a secret).
    pub fn set_expiry(&self, id: SecretId, expires_at: DateTime<Utc>) {
        if let Some(s) = lock(&self.secrets).iter_mut().find(|s| s.id == id) {
            s.expires_at = expires_at;
        }
    }
}

impl SecretRepository for InMemorySecretRepository {
    async fn insert(&self, secret: &Secret) -> Result<(), AuthServiceError> {
        let mut secrets = lock(&self.secrets);
        if secrets.iter().any(|s| s.secret_hash == secret.secret_hash) {
            return Err(AuthServiceError::Internal(anyhow::anyhow!(
                "duplicate secret hash"
            )));
        }
        secrets.push(secret.clone());
        Ok(())
    }

    async fn find_by_hash(
        &self,
        kind: SecretKind,
        secret_hash: &str,
    ) -> Result<Option<Secret>, AuthServiceError> {
        Ok(lock(&self.secrets)
            .iter()
            .find(|s| s.kind == kind && s.secret_hash == secret_hash)
            .cloned())
    }

    async fn consume(&self, id: SecretId, now: DateTime<Utc>) -> Result<bool, AuthServiceError> {
        let mut secrets = lock(&self.secrets);
        let Some(secret) = secrets.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if secret.consumed_at.is_some() || secret.revoked_at.is_some() || secret.expires_at <= now
        {
            return Ok(false);
        }
        secret.consumed_at = Some(now);
        Ok(true)
    }

    async fn touch(&self, id: SecretId, now: DateTime<Utc>) -> Result<(), AuthServiceError> {
        if let Some(s) = lock(&self.secrets).iter_mut().find(|s| s.id == id) {
            s.consumed_at = Some(now);
        }
        Ok(())
    }

    async fn revoke_all_for(
        &self,
        kind: SecretKind,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthServiceError> {
        let mut revoked = 0;
        for s in lock(&self.secrets).iter_mut().filter(|s| {
            s.kind == kind && s.subject == subject && s.revoked_at.is_none() && s.expires_at > now
        }) {
            s.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn revoke(
        &self,
        kind: SecretKind,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        let mut secrets = lock(&self.secrets);
        match secrets
            .iter_mut()
            .find(|s| s.kind == kind && s.secret_hash == secret_hash && s.revoked_at.is_none())
        {
            Some(s) => {
                s.revoked_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let mut secrets = lock(&self.secrets);
        let before = secrets.len();
        secrets.retain(|s| s.expires_at > now);
        Ok((before - secrets.len()) as u64)
    }
}

// ── Rate limiting ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct AttemptLogs {
    by_key: HashMap<String, VecDeque<DateTime<Utc>>>,
    swept_at: Option<DateTime<Utc>>,
}

impl AttemptLogs {
    /// Forget keys whose newest attempt has left the window. Runs at most once
    /// per window.
    fn sweep(&mut self, now: DateTime<Utc>, window: Duration) {
        if self.swept_at.is_some_and(|at| now - at < window) {
            return;
        }
        let cutoff = now - window;
        self.by_key.retain(|_, log| log.back().is_some_and(|t| *t > cutoff));
        self.swept_at = Some(now);
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRateLimitStore {
    logs: Arc<Mutex<AttemptLogs>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of admitted attempts currently logged under `key`.
    pub fn logged(&self, key: &str) -> usize {
        lock(&self.logs).by_key.get(key).map_or(0, VecDeque::len)
    }

    /// Number of keys holding at least one attempt.
    pub fn tracked_keys(&self) -> usize {
        lock(&self.logs).by_key.len()
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    async fn record_attempt(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        let cutoff = now - window;
        let mut logs = lock(&self.logs);
        logs.sweep(now, window);

        let log = logs.by_key.entry(key.to_owned()).or_default();
        while log.front().is_some_and(|t| *t <= cutoff) {
            log.pop_front();
        }
        let admitted = log.len() < limit as usize;
        if admitted {
            log.push_back(now);
        } else if log.is_empty() {
            logs.by_key.remove(key);
        }
        Ok(admitted)
    }
}

// ── Audit ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemoryAuditRepository {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        lock(&self.events).clone()
    }

    /// Event types in append order.
    pub fn event_types(&self) -> Vec<EventType> {
        lock(&self.events).iter().map(|e| e.event_type).collect()
    }
}

impl AuditRepository for InMemoryAuditRepository {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuthServiceError> {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, (Session, DateTime<Utc>)>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every live session that carries an admin account.
    pub fn authenticated(&self) -> Vec<Session> {
        let now = Utc::now();
        lock(&self.sessions)
            .values()
            .filter(|(s, expires_at)| s.is_authenticated() && *expires_at > now)
            .map(|(s, _)| s.clone())
            .collect()
    }
}

impl SessionStore for InMemorySessionStore {
    async fn put(&self, session: &Session, ttl: Duration) -> Result<(), AuthServiceError> {
        let now = Utc::now();
        let mut sessions = lock(&self.sessions);
        // Abandoned anonymous sessions are never read again, so expiry is
        // enforced on write as well.
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        sessions.insert(session.id.clone(), (session.clone(), now + ttl));
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, AuthServiceError> {
        let mut sessions = lock(&self.sessions);
        match sessions.get(id) {
            Some((_, expires_at)) if *expires_at <= Utc::now() => {
                sessions.remove(id);
                Ok(None)
            }
            Some((session, _)) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), AuthServiceError> {
        lock(&self.sessions).remove(id);
        Ok(())
    }
}
