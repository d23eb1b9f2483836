//! Error types for the `fleetwatch-geo` crate.

/// Errors that can occur while building a region grid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    /// The partition threshold must be a positive distance.
    #[error("partition threshold must be positive, got {0} m")]
    InvalidThreshold(f64),

    /// The grid must have at least one division along its longer edge.
    #[error("grid divisions must be at least 1")]
    InvalidDivisions,

    /// Grid spacing came out as zero, negative, or non-finite.
    #[error("degenerate grid spacing: lon_d={lon_d}, lat_d={lat_d}")]
    DegenerateSpacing {
        /// Longitude spacing in degrees.
        lon_d: f64,
        /// Latitude spacing in degrees.
        lat_d: f64,
    },

    /// Sub-cell size must be a positive number of degrees.
    #[error("sub-cell size must be positive, got {0} degrees")]
    InvalidSubCell(f64),
}
