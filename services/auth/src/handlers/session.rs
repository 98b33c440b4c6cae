use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use serde::Serialize;

use latchkey_auth_types::{
    cookie::{LATCHKEY_REMEMBER_ME, LATCHKEY_SESSION, clear_remember_me_cookie, clear_session_cookie},
    origin::ClientOrigin,
};
use latchkey_core::serde::{opt_to_rfc3339_ms, to_rfc3339_ms};
use latchkey_domain::id::AdminAccountId;

use crate::domain::types::Session;
use crate::error::AuthServiceError;
use crate::handlers::LOGIN_PATH;
use crate::state::{AppState, AuthBackend};
use crate::usecase::session::LogoutInput;

// ── GET /admin/session ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub admin_account_id: Option<AdminAccountId>,
    #[serde(serialize_with = "opt_to_rfc3339_ms")]
    pub login_time: Option<DateTime<Utc>>,
    pub login_ip: Option<String>,
    pub csrf_token: String,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        Self {
            admin_account_id: s.admin_account_id,
            login_time: s.login_time,
            login_ip: s.login_ip,
            csrf_token: s.csrf_token,
            created_at: s.created_at,
        }
    }
}

/// Read side for the rest of the admin application.
pub async fn current_session<B: AuthBackend>(
    State(state): State<AppState<B>>,
    jar: CookieJar,
) -> Result<Response, AuthServiceError> {
    let Some(id) = jar.get(LATCHKEY_SESSION).map(|c| c.value().to_owned()) else {
        return Ok(unauthenticated());
    };
    match state.sessions().current(&id).await? {
        Some(session) => Ok(Json(SessionResponse::from(session)).into_response()),
        None => Ok(unauthenticated()),
    }
}

fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "success": false })),
    )
        .into_response()
}

// ── POST /admin/logout ───────────────────────────────────────────────────────

pub async fn logout<B: AuthBackend>(
    State(state): State<AppState<B>>,
    origin: ClientOrigin,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthServiceError> {
    state
        .logout()
        .execute(LogoutInput {
            session_id: jar.get(LATCHKEY_SESSION).map(|c| c.value().to_owned()),
            remember_me_bearer: jar.get(LATCHKEY_REMEMBER_ME).map(|c| c.value().to_owned()),
            origin,
        })
        .await?;

    let jar = clear_session_cookie(jar, state.cookie_domain());
    let jar = clear_remember_me_cookie(jar, state.cookie_domain());
    Ok((jar, Redirect::to(LOGIN_PATH)))
}
