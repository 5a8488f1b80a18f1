//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/upload/init", post(handlers::init_upload))
        .route("/api/upload/chunk", post(handlers::upload_chunk))
        .route(
            "/api/upload/{upload_id}/status",
            get(handlers::upload_status),
        )
        // Health check (intentionally unauthenticated for probes)
        .route("/api/health", get(handlers::health_check));

    let mut router = Router::new().merge(api_routes);

    if state.config.server.metrics_enabled {
        router = router.merge(Router::new().route("/metrics", get(metrics_handler)));
    }

    router
        // Chunk requests carry one chunk plus multipart framing; everything
        // else is far below this ceiling.
        .layer(DefaultBodyLimit::max(
            state.config.server.max_chunk_body_bytes(),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
