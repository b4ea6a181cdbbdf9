use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::sessions::crud;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // The browser client runs on its own origin and sends credentials,
    // so the origin must be explicit rather than a wildcard.
    let cors = match state.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
        Err(_) => {
            tracing::warn!(
                origin = %state.cors_origin,
                "Invalid CORS origin, cross-origin requests will be refused"
            );
            CorsLayer::new()
        }
    };

    let session_routes = Router::new()
        .route("/api/sessions", post(crud::create_session))
        .route("/api/sessions/{session_id}", get(crud::get_session))
        .route(
            "/api/sessions/{session_id}/export",
            post(crud::export_session),
        );

    // WebSocket endpoint — session validated before the actor starts
    let ws_routes = Router::new().route("/ws/{session_id}", get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .route("/", get(root))
        .merge(session_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(cors)
        .with_state(state)
}

/// GET / — API banner.
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Collaborative Whiteboard API" }))
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
