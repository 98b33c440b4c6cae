use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Message shown for every credential or CSRF failure.
pub const INVALID_LINK_MESSAGE: &str = "invalid or expired link";

/// Message shown for malformed input and for dependency outages.
pub const UNABLE_TO_PROCESS_MESSAGE: &str = "unable to process request";

/// Why a presented bearer value was rejected. Recorded in the audit log only;
/// clients always see [`INVALID_LINK_MESSAGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("secret not found")]
    NotFound,
    #[error("secret expired")]
    Expired,
    #[error("secret already consumed")]
    AlreadyConsumed,
    #[error("secret revoked")]
    Revoked,
}

impl CredentialError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::AlreadyConsumed => "already_consumed",
            Self::Revoked => "revoked",
        }
    }
}

/// Auth service error variants.
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("invalid request")]
    InvalidRequest,
    #[error("csrf token mismatch")]
    CsrfMismatch,
    #[error("invalid credential: {0}")]
    Credential(#[from] CredentialError),
    #[error("admin account no longer exists")]
    AccountMissing,
    #[error("dependency unavailable")]
    Dependency(#[source] anyhow::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthServiceError {
    /// Internal classification, used in logs and audit metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::CsrfMismatch => "CSRF_MISMATCH",
            Self::Credential(_) => "INVALID_CREDENTIAL",
            Self::AccountMissing => "ACCOUNT_MISSING",
            Self::Dependency(_) => "DEPENDENCY",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// The only kinds a client can ever observe.
    pub fn public_kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::CsrfMismatch | Self::Credential(_) | Self::AccountMissing => "INVALID_LINK",
            Self::Dependency(_) | Self::Internal(_) => "UNAVAILABLE",
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            Self::CsrfMismatch | Self::Credential(_) | Self::AccountMissing => {
                INVALID_LINK_MESSAGE
            }
            Self::InvalidRequest | Self::Dependency(_) | Self::Internal(_) => {
                UNABLE_TO_PROCESS_MESSAGE
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::CsrfMismatch | Self::Credential(_) | Self::AccountMissing => {
                StatusCode::UNAUTHORIZED
            }
            Self::Dependency(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap a failure of an external collaborator (mail, account store, Redis).
    pub fn dependency(err: impl Into<anyhow::Error>) -> Self {
        Self::Dependency(err.into())
    }
}

impl IntoResponse for AuthServiceError {
    fn into_response(self) -> Response {
        // 4xx are expected client errors and are already in the audit log.
        // Dependency and internal errors need the anyhow chain for operators.
        match &self {
            Self::Dependency(e) => {
                tracing::error!(error = %format!("{e:#}"), kind = "DEPENDENCY", "dependency failure")
            }
            Self::Internal(e) => {
                tracing::error!(error = %format!("{e:#}"), kind = "INTERNAL", "internal error")
            }
            _ => {}
        }
        let body = serde_json::json!({
            "success": false,
            "kind": self.public_kind(),
            "message": self.public_message(),
        });
        (self.status(), axum::Json(body)).into_response()
    }
}
