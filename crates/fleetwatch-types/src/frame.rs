//! JSON frames exchanged with dashboard clients.
//!
//! Outbound, a client sees two frame types:
//!
//! ```text
//! { "type": "region", "region_id": "...", "state": "start" | "cancel" | "end" }
//! { "type": "probe", "region_id": "...", "aggregated": true, "count": 12, "devices": [...] }
//! ```
//!
//! For one tick, every `probe` frame of a partitioned query is sent between
//! the `start` and the matching `end`/`cancel` region frame.

use serde::{Deserialize, Serialize};

use crate::alert::AlertSummary;
use crate::geometry::{BoundingBox, Center};
use crate::ids::RegionId;
use crate::probe::ProbeSample;

/// Lifecycle marker of a partitioned query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionState {
    /// Aggregated frames for a new grid follow.
    Start,
    /// The tick was superseded; no further frames for it.
    Cancel,
    /// All frames for the tick have been sent.
    End,
}

/// A frame pushed to a dashboard client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Control frame bracketing a partitioned query.
    Region {
        /// Key of the grid the frames belong to.
        region_id: String,
        /// Lifecycle marker.
        state: RegionState,
    },
    /// Vehicle data, raw or aggregated.
    Probe {
        /// Key of the grid for aggregated frames, absent for raw ones.
        #[serde(skip_serializing_if = "Option::is_none")]
        region_id: Option<String>,
        /// Whether `devices` holds cell aggregates rather than samples.
        aggregated: bool,
        /// Number of vehicles covered, `-1` if unknown.
        count: i64,
        /// Samples or cell aggregates.
        devices: Vec<Device>,
    },
}

impl OutboundFrame {
    /// Region lifecycle frame.
    pub fn region(region_id: impl Into<String>, state: RegionState) -> Self {
        Self::Region {
            region_id: region_id.into(),
            state,
        }
    }

    /// Raw (non-aggregated) probe frame.
    pub fn raw(count: i64, probes: Vec<ProbeSample>) -> Self {
        Self::Probe {
            region_id: None,
            aggregated: false,
            count,
            devices: probes.into_iter().map(Device::Probe).collect(),
        }
    }

    /// Aggregated probe frame for a grid.
    pub fn aggregated(region_id: impl Into<String>, info: DeviceInfo) -> Self {
        Self::Probe {
            region_id: Some(region_id.into()),
            aggregated: true,
            count: info.count,
            devices: info.devices.into_iter().map(Device::Group).collect(),
        }
    }
}

/// One element of a probe frame's `devices` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Device {
    /// Aggregate of one grid cell.
    Group(GroupDevice),
    /// A raw vehicle sample.
    Probe(ProbeSample),
}

/// Wire form of an aggregation summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// Total sample count, `-1` if any cell failed.
    pub count: i64,
    /// One entry per non-empty or failed cell.
    pub devices: Vec<GroupDevice>,
}

/// Wire form of one cell aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupDevice {
    /// Always `true`.
    pub aggregated: bool,
    /// Key of the cell.
    pub group_id: RegionId,
    /// Cell extent within the watched area.
    pub geometry: BoundingBox,
    /// Tight box around the samples actually seen in the cell.
    #[serde(rename = "validGeometry")]
    pub valid_geometry: Option<BoundingBox>,
    /// Mean sample position.
    pub center: Option<Center>,
    /// Samples in the cell, `-1` if the fetch failed.
    pub count: i64,
    /// Alert digest; aggregated cells are never correlated, so this is
    /// always `null` on the wire today.
    pub alerts: Option<AlertSummary>,
}

/// Message a dashboard client may send on its connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Application-level keepalive.
    Ping,
}
