//! Vehicle telemetry samples ("probes") as returned by the Probe Store.

use serde::{Deserialize, Serialize};

use crate::alert::AlertSummary;

/// One telemetry sample from a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSample {
    /// Vehicle/device identifier.
    pub mo_id: String,
    /// Raw GPS latitude.
    pub lat: f64,
    /// Raw GPS longitude.
    pub lon: f64,
    /// Map-matched latitude, if the store snapped the sample to a road.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_lat: Option<f64>,
    /// Map-matched longitude, if the store snapped the sample to a road.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_lon: Option<f64>,
    /// Sample time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Speed in km/h.
    #[serde(default)]
    pub speed: f64,
    /// Heading in degrees clockwise from north.
    #[serde(default)]
    pub heading: f64,
    /// Free-form vehicle properties forwarded to the dashboard untouched.
    #[serde(default)]
    pub props: serde_json::Map<String, serde_json::Value>,
    /// Decorations attached by the monitor (alerts) or the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ProbeInfo>,
}

impl ProbeSample {
    /// The position used for spatial bucketing: the map-matched position
    /// when both matched coordinates are present, the raw one otherwise.
    pub fn position(&self) -> (f64, f64) {
        match (self.matched_lon, self.matched_lat) {
            (Some(lon), Some(lat)) => (lon, lat),
            _ => (self.lon, self.lat),
        }
    }
}

/// Extra per-sample information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    /// Open alerts of the sample's vehicle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerts: Option<AlertSummary>,
    /// Any other fields the store attached.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
