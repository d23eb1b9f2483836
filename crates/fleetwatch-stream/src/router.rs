//! Axum router construction.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete router:
///
/// - `GET {gateway path}` -- `WebSocket` probe subscription
/// - `GET /api/health` -- liveness
/// - `GET /api/clients` -- current subscriptions
///
/// Browser origins for the streaming route are checked by the gateway, so
/// CORS stays permissive for the read-only REST endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(state.gateway.path(), get(ws::ws_subscribe))
        .route("/api/health", get(handlers::health))
        .route("/api/clients", get(handlers::list_clients))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
