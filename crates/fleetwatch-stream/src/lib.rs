//! Streaming side of the Fleetwatch monitor.
//!
//! This crate turns dashboard subscriptions into a periodic stream of probe
//! frames:
//!
//! - **Stores** ([`store`]) fetch probe samples and alerts from the upstream
//!   HTTP services behind object-safe traits, so tests can swap in doubles.
//! - **Task queue** ([`queue`]) runs per-cell fetches with bounded
//!   concurrency and cancels the ones that have not started when a tick is
//!   superseded.
//! - **Alert correlation** ([`correlator`]) decorates samples with their
//!   vehicle's open alerts and worst severity.
//! - **Stream hub** ([`hub`]) owns the clients and drives the self-paced
//!   tick loop.
//! - **Gateway** ([`gateway`], [`ws`], [`router`], [`server`]) admits
//!   `WebSocket` connections by origin, parses subscriptions, and serves a
//!   small REST surface.
//!
//! Configuration is loaded by [`config`] from `fleetwatch-config.yaml`.

pub mod config;
pub mod correlator;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod hub;
pub mod queue;
pub mod router;
pub mod server;
pub mod state;
pub mod store;
pub mod ws;

pub use config::{ConfigError, MonitorConfig};
pub use correlator::AlertCorrelator;
pub use error::{StoreError, StreamError};
pub use gateway::{AppOriginPolicy, ConnectionGateway, OriginPolicy, SubscriptionParams};
pub use hub::{ClientSink, HubConfig, StreamHub, TickReport};
pub use queue::{Task, TaskCanceled, TaskHandle, TaskQueue};
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
pub use store::{AlertStore, HttpAlertStore, HttpProbeStore, ProbeQuery, ProbeStore};
