//! `WebSocket` handler for probe subscriptions.
//!
//! A client connects to the gateway's route with either
//! `?region=<json bbox>` or `?mo_id=<vehicle>`. The request is checked
//! against the origin policy (403 on refusal) and the query is parsed into a
//! subscription (400 on failure) before the upgrade. Once upgraded, the
//! client is registered with the hub and every frame the hub produces for it
//! is forwarded as a JSON text message.
//!
//! Inbound text is parsed as a [`ClientMessage`]; malformed messages are
//! logged and otherwise ignored. Closing the socket unsubscribes the client,
//! which abandons its pending cell fetches.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use fleetwatch_types::{ClientId, ClientMessage, OutboundFrame, SubscriptionFilter};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::gateway::SubscriptionParams;
use crate::state::AppState;

/// Admit, parse, and upgrade a subscription request.
///
/// # Route
///
/// `GET {gateway path}?region=...` or `GET {gateway path}?mo_id=...`
pub async fn ws_subscribe(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<SubscriptionParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, StreamError> {
    state.gateway.admit(&headers)?;
    let filter = params.into_filter()?;
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, state, filter)))
}

/// Register with the hub, pump frames until either side goes away, then
/// unsubscribe.
async fn handle_ws(socket: WebSocket, state: Arc<AppState>, filter: SubscriptionFilter) {
    let (tx, rx) = mpsc::channel(state.hub.config().client_channel_capacity);
    let id = state.hub.subscribe(filter, tx);
    info!(client = %id, "client connected");

    pump(socket, rx, id).await;

    state.hub.unsubscribe(id);
    info!(client = %id, "client disconnected");
}

async fn pump(mut socket: WebSocket, mut rx: mpsc::Receiver<OutboundFrame>, id: ClientId) {
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    debug!(client = %id, "hub dropped client channel");
                    return;
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!(client = %id, "failed to serialize frame: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!(client = %id, "send failed");
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(client = %id, "pong failed");
                            return;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(ClientMessage::Ping) => debug!(client = %id, "keepalive"),
                            Err(e) => warn!(client = %id, "ignoring malformed client message: {e}"),
                        }
                    }
                    Some(Err(e)) => {
                        debug!(client = %id, "WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
