use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints that need no credentials.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /api/health
        // Liveness check for load balancers and monitoring.
        .route("/api/health", get(handlers::health))
}
