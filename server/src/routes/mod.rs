//! HTTP routes

pub mod classes;
pub mod health;
pub mod predict;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

/// Build the application router
pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.body_limit;

    Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health_check))
        .route("/api/classes", get(classes::list_classes))
        .route("/api/predict", post(predict::predict))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
