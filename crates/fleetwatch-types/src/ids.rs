//! Identifier wrappers.
//!
//! Connected dashboard clients get a time-ordered UUID v7 so log lines sort
//! by connection order. Grid regions are keyed by a deterministic string
//! derived from their cell indices and spacing, which keeps the key stable
//! across ticks and across overlapping queries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a connected dashboard client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic key of one grid cell: `"{lon_index}:{lat_index}:{lon_d}:{lat_d}"`.
///
/// Two points inside the same cell of grids with the same spacing always
/// produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// Build the key for the cell at the given indices of a grid with the
    /// given spacing (in degrees).
    pub fn new(lon_index: i64, lat_index: i64, lon_d: f64, lat_d: f64) -> Self {
        Self(format!("{lon_index}:{lat_index}:{lon_d}:{lat_d}"))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RegionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
