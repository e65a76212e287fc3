//! Router assembly and shared middleware.

use super::handlers::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build(state: AppState, frontend_origin: Option<String>) -> Router {
    let cors = match frontend_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<axum::http::HeaderValue>().expect("FRONTEND_URL must be a valid header value"))
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/episodes", post(handlers::create_episode))
        .route("/train", post(handlers::train))
        .route("/stop", post(handlers::stop))
        .route("/stream", get(handlers::stream))
        .route("/llm/generate", post(handlers::llm_generate))
        .route("/llm/validate", post(handlers::llm_validate))
        .route("/llm/operations", get(handlers::llm_operations))
        .route("/llm/health", get(handlers::llm_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
