use std::net::SocketAddr;

use sea_orm::Database;
use tracing::info;

use latchkey_auth::config::AuthConfig;
use latchkey_auth::router::build_router;
use latchkey_auth::state::{AppState, LiveBackend};
use latchkey_auth::usecase::sweep::spawn_purge_task;
use latchkey_core::config::Config;
use latchkey_core::tracing::init_tracing;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = AuthConfig::from_env();
    config.check().expect("invalid auth configuration");

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis = redis_cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("failed to create Redis pool");

    let http = reqwest::Client::builder()
        .timeout(config.external_timeout())
        .build()
        .expect("failed to build HTTP client");

    let backend = LiveBackend::new(db, redis, http, &config);
    let state = AppState::new(backend, config.clone());

    spawn_purge_task(state.secret_store(), config.purge_interval());

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.auth_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("auth service listening on {addr}");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
