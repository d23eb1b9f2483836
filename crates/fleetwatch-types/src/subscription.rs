//! What a dashboard client watches for the lifetime of its connection.

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// Subscription filter parsed once from the connection request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubscriptionFilter {
    /// Every vehicle inside a map extent.
    Extent {
        /// The watched area.
        bbox: BoundingBox,
    },
    /// A single vehicle.
    Vehicle {
        /// The watched vehicle.
        mo_id: String,
    },
}
