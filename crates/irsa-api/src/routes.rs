//! Router definition.

use axum::{Router, extract::DefaultBodyLimit, middleware, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::health;
use crate::middleware::request_id;
use crate::proxy::forward;
use crate::state::AppState;

/// Create the proxy router: local health routes, everything else to STS.
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .fallback(forward)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
