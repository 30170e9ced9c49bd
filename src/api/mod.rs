//! API routes and handlers
//!
//! Health probes and read-only inspection of users, channels and the vector
//! store. All routes are mounted under `/api/v1`.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

mod channels;
mod health;
mod stats;

pub use health::*;

/// Public API routes
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // Health check endpoints
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        // Inspection endpoints
        .nest("/channels", channels::routes())
        .nest("/users", channels::user_routes())
        .nest("/stats", stats::routes())
}

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", public_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
