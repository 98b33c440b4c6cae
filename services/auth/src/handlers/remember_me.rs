use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;

use latchkey_auth_types::{
    cookie::{LATCHKEY_REMEMBER_ME, LATCHKEY_SESSION, clear_remember_me_cookie, set_session_cookie},
    origin::ClientOrigin,
};

use crate::handlers::{ADMIN_HOME, LOGIN_PATH, cookie_max_age};
use crate::state::{AppState, AuthBackend};
use crate::usecase::remember_me::{AutoLoginInput, should_clear_cookie};

// ── GET /admin/auto-login ────────────────────────────────────────────────────

/// Turn a remember-me cookie into a fresh session. A dead cookie is cleared so
/// the browser stops presenting it.
pub async fn auto_login<B: AuthBackend>(
    State(state): State<AppState<B>>,
    origin: ClientOrigin,
    jar: CookieJar,
) -> Response {
    let Some(bearer) = jar.get(LATCHKEY_REMEMBER_ME).map(|c| c.value().to_owned()) else {
        return Redirect::to(LOGIN_PATH).into_response();
    };
    let previous_session_id = jar.get(LATCHKEY_SESSION).map(|c| c.value().to_owned());

    let result = state
        .auto_login()
        .execute(AutoLoginInput {
            bearer,
            previous_session_id,
            origin,
        })
        .await;

    match result {
        Ok(handle) => {
            let jar = set_session_cookie(
                jar,
                handle.session_id,
                state.cookie_domain(),
                cookie_max_age(state.config.session_policy().ttl),
            );
            (jar, Redirect::to(ADMIN_HOME)).into_response()
        }
        Err(e) if should_clear_cookie(&e) => {
            let jar = clear_remember_me_cookie(jar, state.cookie_domain());
            (jar, Redirect::to(LOGIN_PATH)).into_response()
        }
        Err(e) => {
            // Keep the cookie: the credential may be fine once storage recovers.
            tracing::error!(error = ?e, kind = e.kind(), "auto-login failed");
            Redirect::to(LOGIN_PATH).into_response()
        }
    }
}
