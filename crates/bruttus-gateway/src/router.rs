use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::SharedState;

/// Build the application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    // Per-IP rate limit from config (default: 1 req/sec, burst 30).
    let rl = &state.config.gateway.rate_limit;
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(rl.per_second.max(1))
        .burst_size(rl.burst_size.max(1))
        .finish()
        .expect("governor config should be valid");
    let governor_limiter = governor_conf.limiter().clone();
    let governor_layer = GovernorLayer::new(governor_conf);

    // Forget limiter state for clients that went quiet.
    tokio::spawn(async move {
        let interval = Duration::from_secs(60);
        loop {
            tokio::time::sleep(interval).await;
            governor_limiter.retain_recent();
        }
    });

    // Each `Router::layer` re-boxes the response body, which `CorsLayer` needs.
    routes(state)
        .layer(governor_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// The routes without the rate limiter or middleware.
pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(api::status))
        .route(
            "/api/messages",
            get(api::list_messages).post(api::send_message),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
