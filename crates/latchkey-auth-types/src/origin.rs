//! Client origin extractor (IP + user agent) for audit and forensic fields.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRef, FromRequestParts};
use http::HeaderMap;
use http::request::Parts;
use serde::Serialize;

/// Placeholder recorded when no address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Longest user agent kept; the rest is cut off before storage.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// How many reverse proxies sit in front of the service.
///
/// Each trusted proxy appends the address it received the connection from to
/// `x-forwarded-for`, so the client address is the entry `trusted_hops` places
/// from the right. Everything further left was written by the client. Zero
/// ignores the header and uses the socket peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyPolicy {
    pub trusted_hops: usize,
}

impl ProxyPolicy {
    pub fn new(trusted_hops: usize) -> Self {
        Self { trusted_hops }
    }

    fn forwarded_client(&self, headers: &HeaderMap) -> Option<IpAddr> {
        if self.trusted_hops == 0 {
            return None;
        }
        // Repeated headers are one list in arrival order.
        let hops: Vec<&str> = headers
            .get_all("x-forwarded-for")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .collect();
        let index = hops.len().checked_sub(self.trusted_hops)?;
        hops[index].parse().ok()
    }
}

/// Where a request came from.
///
/// Only proxy hops configured through [`ProxyPolicy`] are believed; otherwise
/// the socket peer address is used. This value is never used to authenticate.
/// It feeds audit records, rate-limit keys and the login notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientOrigin {
    pub ip: String,
    pub user_agent: Option<String>,
}

impl ClientOrigin {
    pub fn new(ip: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent,
        }
    }

    fn from_parts(policy: ProxyPolicy, headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let ip = policy
            .forwarded_client(headers)
            .or_else(|| peer.map(|addr| addr.ip()))
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_IP.to_owned());

        let user_agent = headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect::<String>())
            .filter(|ua| !ua.is_empty());

        Self { ip, user_agent }
    }
}

impl<S> FromRequestParts<S> for ClientOrigin
where
    ProxyPolicy: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    // Values are read synchronously and moved into a 'static future; axum-core
    // declares this as `fn -> impl Future + Send`.
    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let origin = Self::from_parts(ProxyPolicy::from_ref(state), &parts.headers, peer);
        async move { Ok(origin) }
    }
}
