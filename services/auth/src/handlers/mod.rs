pub mod health;
pub mod magic_link;
pub mod remember_me;
pub mod session;

/// Admin landing page after any successful login.
pub const ADMIN_HOME: &str = "/admin";

pub const LOGIN_PATH: &str = "/admin/login";

/// Every failed verification ends here, whatever the reason.
pub const INVALID_LINK_REDIRECT: &str = "/admin/login?error=invalid_link";

/// Cookie `Max-Age` matching a server-side lifetime.
pub(crate) fn cookie_max_age(ttl: chrono::Duration) -> time::Duration {
    time::Duration::seconds(ttl.num_seconds())
}
