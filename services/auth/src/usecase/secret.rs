use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use sha2::{Digest, Sha256};

use latchkey_auth_types::origin::ClientOrigin;
use latchkey_domain::id::SecretId;

use crate::domain::repository::SecretRepository;
use crate::domain::types::{ConsumptionPolicy, IssuedSecret, SECRET_BYTES, Secret, SecretKind};
use crate::error::{AuthServiceError, CredentialError};

/// 256 random bits, base64url without padding (43 chars).
pub fn generate_bearer() -> String {
    let bytes: [u8; SECRET_BYTES] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Lowercase hex SHA-256 of a bearer value. This is the stored lookup key.
pub fn hash_secret(bearer: &str) -> String {
    hex::encode(Sha256::digest(bearer.as_bytes()))
}

/// Bearer values are always 43 base64url chars; anything else cannot match a
/// stored row and is rejected before touching storage.
fn is_well_formed(bearer: &str) -> bool {
    bearer.len() == 43
        && bearer
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Generates, hashes and persists bearer secrets and enforces the
/// per-kind consumption policy.
#[derive(Clone)]
pub struct SecretStore<R: SecretRepository> {
    pub repo: R,
}

impl<R: SecretRepository> SecretStore<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Create and persist a secret for `subject`. The returned bearer value is
    /// the only copy; storage keeps its hash.
    pub async fn issue(
        &self,
        kind: SecretKind,
        subject: &str,
        ttl: Duration,
        origin: Option<&ClientOrigin>,
    ) -> Result<IssuedSecret, AuthServiceError> {
        let bearer = generate_bearer();
        let now = Utc::now();
        let secret = Secret {
            id: SecretId::new(),
            kind,
            secret_hash: hash_secret(&bearer),
            subject: subject.to_owned(),
            issued_at: now,
            expires_at: now + ttl,
            consumed_at: None,
            revoked_at: None,
            origin_ip: origin.map(|o| o.ip.clone()),
            user_agent: origin.and_then(|o| o.user_agent.clone()),
        };
        self.repo.insert(&secret).await?;
        Ok(IssuedSecret {
            id: secret.id,
            bearer,
            expires_at: secret.expires_at,
        })
    }

    /// Validate a bearer value of `kind` and apply its consumption policy.
    ///
    /// Single-use secrets are consumed by one conditional update, so of any
    /// number of concurrent callers exactly one gets `Ok`; the rest see
    /// `AlreadyConsumed`. Multi-use secrets only get their last-used stamp.
    pub async fn validate_and_consume(
        &self,
        kind: SecretKind,
        bearer: &str,
    ) -> Result<Secret, AuthServiceError> {
        self.validate_at(kind, bearer, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        kind: SecretKind,
        bearer: &str,
        now: DateTime<Utc>,
    ) -> Result<Secret, AuthServiceError> {
        if !is_well_formed(bearer) {
            return Err(CredentialError::NotFound.into());
        }
        let secret = self
            .repo
            .find_by_hash(kind, &hash_secret(bearer))
            .await?
            .ok_or(CredentialError::NotFound)?;

        if secret.revoked_at.is_some() {
            return Err(CredentialError::Revoked.into());
        }
        if secret.is_expired_at(now) {
            return Err(CredentialError::Expired.into());
        }

        match kind.policy() {
            ConsumptionPolicy::SingleUse => {
                if secret.consumed_at.is_some() || !self.repo.consume(secret.id, now).await? {
                    return Err(CredentialError::AlreadyConsumed.into());
                }
                Ok(Secret {
                    consumed_at: Some(now),
                    ..secret
                })
            }
            ConsumptionPolicy::MultiUse => {
                self.repo.touch(secret.id, now).await?;
                Ok(Secret {
                    consumed_at: Some(now),
                    ..secret
                })
            }
        }
    }

    /// Revoke every live secret of `kind` held by `subject`.
    pub async fn revoke_all_for(
        &self,
        kind: SecretKind,
        subject: &str,
    ) -> Result<u64, AuthServiceError> {
        self.repo.revoke_all_for(kind, subject, Utc::now()).await
    }

    /// Revoke the one secret a bearer value names. Malformed or unknown bearer
    /// values are a no-op.
    pub async fn revoke(&self, kind: SecretKind, bearer: &str) -> Result<bool, AuthServiceError> {
        if !is_well_formed(bearer) {
            return Ok(false);
        }
        self.repo.revoke(kind, &hash_secret(bearer), Utc::now()).await
    }

    pub async fn purge_expired(&self) -> Result<u64, AuthServiceError> {
        self.repo.purge_expired(Utc::now()).await
    }

    /// Spend the same generate-and-hash work as `issue` without storing
    /// anything. Used on paths that must look like issuance.
    pub fn decoy(&self) {
        let bearer = generate_bearer();
        std::hint::black_box(hash_secret(&bearer));
    }
}
