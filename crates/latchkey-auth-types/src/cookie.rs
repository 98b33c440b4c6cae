//! Cookie builders for the admin session and the remember-me credential.
//!
//! Both cookies are `HttpOnly`, `Secure`, `SameSite=Lax` and scoped to `/admin`.
//! Lax (not Strict) because the login link is opened from a mail client, which
//! is a cross-site top-level navigation.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

/// Cookie name for the server-side session id.
pub const LATCHKEY_SESSION: &str = "latchkey_session";

/// Cookie name for the remember-me bearer value.
pub const LATCHKEY_REMEMBER_ME: &str = "latchkey_remember_me";

/// Path both cookies are scoped to.
pub const ADMIN_COOKIE_PATH: &str = "/admin";

fn admin_cookie(name: &'static str, value: String, domain: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(ADMIN_COOKIE_PATH)
        .domain(domain)
        .max_age(max_age)
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Set the session cookie on the jar.
///
/// ```
/// use axum_extra::extract::cookie::CookieJar;
/// use latchkey_auth_types::cookie::{set_session_cookie, LATCHKEY_SESSION};
///
/// let jar = CookieJar::new();
/// let jar = set_session_cookie(jar, "sid".to_string(), "example.org".to_string(), time::Duration::hours(12));
/// let cookie = jar.get(LATCHKEY_SESSION).unwrap();
/// assert_eq!(cookie.path(), Some("/admin"));
/// assert_eq!(cookie.domain(), Some("example.org"));
/// assert_eq!(cookie.max_age(), Some(time::Duration::hours(12)));
/// assert!(cookie.http_only().unwrap_or(false));
/// assert!(cookie.secure().unwrap_or(false));
/// ```
pub fn set_session_cookie(
    jar: CookieJar,
    session_id: String,
    domain: String,
    max_age: Duration,
) -> CookieJar {
    jar.add(admin_cookie(LATCHKEY_SESSION, session_id, domain, max_age))
}

/// Set the remember-me cookie on the jar.
///
/// ```
/// use axum_extra::extract::cookie::CookieJar;
/// use latchkey_auth_types::cookie::{set_remember_me_cookie, LATCHKEY_REMEMBER_ME};
///
/// let jar = CookieJar::new();
/// let jar = set_remember_me_cookie(jar, "bearer".to_string(), "example.org".to_string(), time::Duration::days(30));
/// let cookie = jar.get(LATCHKEY_REMEMBER_ME).unwrap();
/// assert_eq!(cookie.value(), "bearer");
/// assert_eq!(cookie.max_age(), Some(time::Duration::days(30)));
/// ```
pub fn set_remember_me_cookie(
    jar: CookieJar,
    bearer: String,
    domain: String,
    max_age: Duration,
) -> CookieJar {
    jar.add(admin_cookie(LATCHKEY_REMEMBER_ME, bearer, domain, max_age))
}

/// Expire the session cookie (Max-Age 0).
pub fn clear_session_cookie(jar: CookieJar, domain: String) -> CookieJar {
    jar.add(admin_cookie(
        LATCHKEY_SESSION,
        String::new(),
        domain,
        Duration::ZERO,
    ))
}

/// Expire the remember-me cookie (Max-Age 0). Sent whenever the bearer value
/// fails validation so the browser stops presenting it.
pub fn clear_remember_me_cookie(jar: CookieJar, domain: String) -> CookieJar {
    jar.add(admin_cookie(
        LATCHKEY_REMEMBER_ME,
        String::new(),
        domain,
        Duration::ZERO,
    ))
}
