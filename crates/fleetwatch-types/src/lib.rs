//! Shared type definitions for the Fleetwatch streaming monitor.
//!
//! This crate is the single source of truth for the data that flows between
//! the probe/alert stores, the partitioner, and the dashboard clients.
//!
//! # Modules
//!
//! - [`ids`] -- Identifier wrappers (clients, grid regions)
//! - [`geometry`] -- Normalized bounding boxes and centroids
//! - [`probe`] -- Vehicle telemetry samples
//! - [`alert`] -- Vehicle alerts and per-vehicle alert summaries
//! - [`subscription`] -- What a dashboard client is watching
//! - [`frame`] -- Outbound JSON frames pushed to dashboard clients

pub mod alert;
pub mod frame;
pub mod geometry;
pub mod ids;
pub mod probe;
pub mod subscription;

// Re-export all public types at crate root for convenience.
pub use alert::{Alert, AlertPage, AlertSeverity, AlertSummary};
pub use frame::{ClientMessage, Device, DeviceInfo, GroupDevice, OutboundFrame, RegionState};
pub use geometry::{BoundingBox, Center, GeometryError};
pub use ids::{ClientId, RegionId};
pub use probe::{ProbeInfo, ProbeSample};
pub use subscription::SubscriptionFilter;
