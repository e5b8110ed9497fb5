use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        // Session
        .route("/setup", post(handlers::setup))
        .route("/status", post(handlers::status))
        // Head lifecycle
        .route("/start", post(handlers::start))
        .route("/close", post(handlers::close))
        .route("/abort", post(handlers::abort))
        // Funds
        .route("/balance", post(handlers::balance))
        .route("/balancel2", post(handlers::balance_l2))
        .route("/payment", post(handlers::payment))
        .route("/withdrawal", post(handlers::withdrawal))
        .route("/refund", post(handlers::refund))
        // Add state, request tracing and CORS
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
