//! Geospatial partitioning for the Fleetwatch streaming monitor.
//!
//! Everything in this crate is synchronous and pure: the stream hub calls
//! into it between fetches and never awaits inside it.
//!
//! # Modules
//!
//! - [`geodesy`] -- Haversine distance and destination point
//! - [`grid`] -- Stable region grids over a bounding box
//! - [`aggregate`] -- Per-cell bucketing, summaries, and wire conversion
//! - [`error`] -- Error types for this crate

pub mod aggregate;
pub mod error;
pub mod geodesy;
pub mod grid;

pub use aggregate::{
    AggregationGroup, Summary, UNKNOWN_COUNT, aggregate, convert_to_device_info, create_summary,
    merge_failures,
};
pub use error::GeoError;
pub use geodesy::{EARTH_RADIUS_M, destination, distance};
pub use grid::{
    DEFAULT_GRID_DIVISIONS, DEFAULT_THRESHOLD_M, GridLayout, GridOptions, Partition, Region, RegionGrid, create_regions, round_to_nice_unit,
    split_into_sub_cells,
};
