//! Map service API library.
//!
//! Exposes the router and state so integration tests can drive the service
//! without binding a socket.

pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// All routes of the service.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/layers", get(handlers::layers_handler))
        .route("/api/styles/:layer", get(handlers::styles_handler))
        .route("/api/plan", get(handlers::plan_handler))
        .route("/api/db-styles/:id", get(handlers::stored_style_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
