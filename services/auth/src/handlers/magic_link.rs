use axum::{
    Form, Json,
    extract::{Query, State, rejection::FormRejection, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use latchkey_auth_types::{
    cookie::{LATCHKEY_SESSION, set_remember_me_cookie, set_session_cookie},
    origin::ClientOrigin,
};

use crate::domain::types::{AuditEvent, EventType, Outcome};
use crate::error::AuthServiceError;
use crate::handlers::{ADMIN_HOME, INVALID_LINK_REDIRECT, cookie_max_age};
use crate::state::{AppState, AuthBackend};
use crate::usecase::magic_link::{RequestMagicLinkInput, VERIFY_PATH, VerifyMagicLinkInput};
use crate::usecase::mail::escape_html;

/// Body of every accepted issuance request.
pub const LINK_REQUESTED_MESSAGE: &str = "if registered, you will receive a link";

fn is_truthy(flag: Option<&str>) -> bool {
    matches!(flag, Some("1" | "true" | "on" | "yes"))
}

// ── POST /admin/request-magic-link ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct RequestMagicLinkRequest {
    pub email: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize)]
pub struct RequestMagicLinkResponse {
    pub success: bool,
    pub message: &'static str,
}

pub async fn request_magic_link<B: AuthBackend>(
    State(state): State<AppState<B>>,
    origin: ClientOrigin,
    body: Result<Json<RequestMagicLinkRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            state
                .audit_log()
                .record(
                    AuditEvent::new(EventType::InvalidRequest, Outcome::Failed)
                        .with_origin(&origin)
                        .with_detail("reason", rejection.body_text()),
                )
                .await;
            return Err(AuthServiceError::InvalidRequest);
        }
    };

    state
        .request_magic_link()
        .execute(RequestMagicLinkInput {
            email: body.email,
            remember_me: body.remember_me,
            origin,
        })
        .await?;

    Ok((
        StatusCode::OK,
        Json(RequestMagicLinkResponse {
            success: true,
            message: LINK_REQUESTED_MESSAGE,
        }),
    ))
}

// ── GET /admin/verify-magic-link ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyLandingQuery {
    #[serde(default)]
    pub token: String,
    pub remember: Option<String>,
}

/// Landing page for the emailed link. Renders a self-submitting form and never
/// touches the secret, so link scanners that prefetch the URL burn nothing.
pub async fn verify_landing<B: AuthBackend>(
    State(state): State<AppState<B>>,
    jar: CookieJar,
    Query(query): Query<VerifyLandingQuery>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let sessions = state.sessions();
    let session = sessions
        .load_or_start(jar.get(LATCHKEY_SESSION).map(|c| c.value()))
        .await?;

    let jar = set_session_cookie(
        jar,
        session.id.clone(),
        state.cookie_domain(),
        cookie_max_age(sessions.policy.ttl),
    );
    let page = render_landing(
        &query.token,
        &session.csrf_token,
        is_truthy(query.remember.as_deref()),
    );

    Ok((
        jar,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::REFERRER_POLICY, "no-referrer"),
        ],
        Html(page),
    ))
}

pub fn render_landing(token: &str, csrf_token: &str, remember_me: bool) -> String {
    let token = escape_html(token);
    let csrf_token = escape_html(csrf_token);
    let remember = if remember_me { "1" } else { "0" };
    format!(
        r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><meta name="robots" content="noindex"><title>Signing in</title></head>
<body>
<form id="magic-link" method="post" action="{VERIFY_PATH}">
<input type="hidden" name="token" value="{token}">
<input type="hidden" name="csrf_token" value="{csrf_token}">
<input type="hidden" name="remember_me" value="{remember}">
<noscript><button type="submit">Continue signing in</button></noscript>
</form>
<script>document.getElementById("magic-link").submit();</script>
</body>
</html>
"#
    )
}

// ── POST /admin/verify-magic-link ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyMagicLinkForm {
    pub token: String,
    pub csrf_token: String,
    pub remember_me: Option<String>,
}

/// Consumes the link. Success and failure are both `303` redirects; failures
/// all land on the same generic login error.
pub async fn verify_magic_link<B: AuthBackend>(
    State(state): State<AppState<B>>,
    origin: ClientOrigin,
    jar: CookieJar,
    form: Result<Form<VerifyMagicLinkForm>, FormRejection>,
) -> Response {
    let Ok(Form(form)) = form else {
        return Redirect::to(INVALID_LINK_REDIRECT).into_response();
    };

    let sessions = state.sessions();
    let session = match jar.get(LATCHKEY_SESSION) {
        Some(cookie) => match sessions.load(cookie.value()).await {
            Ok(session) => session,
            Err(e) => return failure_redirect(e),
        },
        None => None,
    };

    let result = state
        .verify_magic_link()
        .execute(VerifyMagicLinkInput {
            bearer: form.token,
            csrf_token: form.csrf_token,
            session,
            remember_me: is_truthy(form.remember_me.as_deref()),
            origin,
        })
        .await;

    match result {
        Ok(out) => {
            let domain = state.cookie_domain();
            let mut jar = set_session_cookie(
                jar,
                out.session.session_id,
                domain.clone(),
                cookie_max_age(sessions.policy.ttl),
            );
            if let Some(remember) = out.remember_me {
                jar = set_remember_me_cookie(
                    jar,
                    remember.bearer,
                    domain,
                    cookie_max_age(state.config.remember_me_policy().ttl),
                );
            }
            (jar, Redirect::to(ADMIN_HOME)).into_response()
        }
        Err(e) => failure_redirect(e),
    }
}

fn failure_redirect(err: AuthServiceError) -> Response {
    if matches!(
        err,
        AuthServiceError::Dependency(_) | AuthServiceError::Internal(_)
    ) {
        tracing::error!(error = ?err, kind = err.kind(), "magic link verification failed");
    }
    Redirect::to(INVALID_LINK_REDIRECT).into_response()
}
