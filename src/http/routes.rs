use super::handlers;
use super::state::AppState;
use super::ws;
use axum::{routing::get, Router};
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Create the HTTP router with all routes
///
/// When `static_dir` is set its files are served for any unmatched path.
pub fn create_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Event protocol
        .route("/ws", get(ws::ws_upgrade))
        // Session introspection
        .route("/api/sessions", get(handlers::list_sessions))
        .route(
            "/api/sessions/:session_id/stats",
            get(handlers::session_stats),
        );

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
