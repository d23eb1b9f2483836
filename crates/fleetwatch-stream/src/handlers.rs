//! REST endpoint handlers.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Liveness plus connected client count |
//! | `GET` | `/api/clients` | Current subscriptions |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use fleetwatch_types::{ClientId, SubscriptionFilter};
use serde::Serialize;

use crate::state::AppState;

/// One entry of `GET /api/clients`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientSummary {
    /// Connection identifier.
    pub id: ClientId,
    /// What the client subscribed to.
    pub filter: SubscriptionFilter,
}

/// `GET /api/health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "clients": state.hub.client_count(),
    }))
}

/// `GET /api/clients`
pub async fn list_clients(State(state): State<Arc<AppState>>) -> Json<Vec<ClientSummary>> {
    let clients = state
        .hub
        .subscriptions()
        .into_iter()
        .map(|(id, filter)| ClientSummary { id, filter })
        .collect();
    Json(clients)
}
