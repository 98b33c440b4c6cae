use chrono::{DateTime, Duration, Utc};
use deadpool_redis::Pool;
use deadpool_redis::redis::{self, AsyncCommands};
use uuid::Uuid;

use crate::domain::repository::{RateLimitStore, SessionStore};
use crate::domain::types::Session;
use crate::error::AuthServiceError;

fn session_key(id: &str) -> String {
    format!("session:{id}")
}

fn internal(e: impl Into<anyhow::Error>) -> AuthServiceError {
    AuthServiceError::Internal(e.into())
}

/// Sliding-log limiter over a Redis sorted set per key (score = epoch ms).
#[derive(Clone)]
pub struct RedisRateLimitStore {
    pub pool: Pool,
}

impl RateLimitStore for RedisRateLimitStore {
    async fn record_attempt(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        let mut conn = self.pool.get().await.map_err(internal)?;

        let now_ms = now.timestamp_millis();
        let cutoff_ms = now_ms - window.num_milliseconds();
        let member = format!("{now_ms}:{}", Uuid::new_v4());

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(key, "-inf", cutoff_ms)
            .ignore()
            .zadd(key, &member, now_ms)
            .ignore()
            .zcard(key)
            .pexpire(key, window.num_milliseconds())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(internal)?;

        if count > u64::from(limit) {
            // Only admitted attempts stay in the log.
            let _: u64 = conn.zrem(key, &member).await.map_err(internal)?;
            return Ok(false);
        }
        Ok(true)
    }
}

/// Sessions as JSON strings under `session:<id>` with a server-side TTL.
#[derive(Clone)]
pub struct RedisSessionStore {
    pub pool: Pool,
}

impl SessionStore for RedisSessionStore {
    async fn put(&self, session: &Session, ttl: Duration) -> Result<(), AuthServiceError> {
        let mut conn = self.pool.get().await.map_err(internal)?;
        let json = serde_json::to_string(session).map_err(internal)?;
        let ttl_secs = ttl.num_seconds().max(1) as u64;
        let (): () = conn
            .set_ex(session_key(&session.id), json, ttl_secs)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, AuthServiceError> {
        let mut conn = self.pool.get().await.map_err(internal)?;
        let value: Option<String> = conn.get(session_key(id)).await.map_err(internal)?;
        value
            .map(|json| serde_json::from_str(&json).map_err(internal))
            .transpose()
    }

    async fn delete(&self, id: &str) -> Result<(), AuthServiceError> {
        let mut conn = self.pool.get().await.map_err(internal)?;
        let _: u64 = conn.del(session_key(id)).await.map_err(internal)?;
        Ok(())
    }
}

/// `PING` over a pooled connection, for the readiness probe.
pub async fn ping(pool: &Pool) -> bool {
    let Ok(mut conn) = pool.get().await else {
        return false;
    };
    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .is_ok()
}
