use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use latchkey_core::health::healthz;
use latchkey_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::handlers::{
    health::readyz,
    magic_link::{request_magic_link, verify_landing, verify_magic_link},
    remember_me::auto_login,
    session::{current_session, logout},
};
use crate::state::{AppState, AuthBackend};

pub fn build_router<B: AuthBackend>(state: AppState<B>) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz::<B>))
        // Magic link
        .route("/admin/request-magic-link", post(request_magic_link::<B>))
        .route(
            "/admin/verify-magic-link",
            get(verify_landing::<B>).post(verify_magic_link::<B>),
        )
        // Remember me
        .route("/admin/auto-login", get(auto_login::<B>))
        // Session
        .route("/admin/session", get(current_session::<B>))
        .route("/admin/logout", post(logout::<B>))
        .layer(
            ServiceBuilder::new()
                .layer(request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer()),
        )
        .with_state(state)
}
