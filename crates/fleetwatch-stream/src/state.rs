//! Shared application state for the gateway server.

use std::sync::Arc;

use crate::gateway::ConnectionGateway;
use crate::hub::StreamHub;

/// Shared state for the Axum application, injected via `State`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The hub that owns subscriptions and drives ticks.
    pub hub: Arc<StreamHub>,
    /// Admission rules for the streaming route.
    pub gateway: Arc<ConnectionGateway>,
}

impl AppState {
    /// Bundle a hub and its gateway.
    pub const fn new(hub: Arc<StreamHub>, gateway: Arc<ConnectionGateway>) -> Self {
        Self { hub, gateway }
    }
}
