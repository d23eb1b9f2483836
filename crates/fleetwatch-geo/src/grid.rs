//! Stable region grids over a bounding box.
//!
//! A [`RegionGrid`] divides a query area into cells whose spacing is snapped
//! to a "nice" decimal and whose origin is anchored to absolute multiples of
//! that spacing. The same geography therefore always lands in the same
//! [`RegionId`], whatever the exact query window, which lets the stream hub
//! recognise an unchanged grid between ticks.
//!
//! Cells are half-open on their lower bound: a point exactly on a cell's
//! western (southern) edge belongs to that cell, not to its neighbour.

use std::collections::BTreeMap;

use fleetwatch_types::{BoundingBox, ProbeSample, RegionId};

use crate::error::GeoError;
use crate::geodesy::{EARTH_RADIUS_M, destination, distance};

/// Default minimum edge length (meters) above which an area is partitioned.
pub const DEFAULT_THRESHOLD_M: f64 = 100_000.0;

/// Default number of divisions along the longer edge.
pub const DEFAULT_GRID_DIVISIONS: u32 = 8;

/// Tolerance, in cell units, for treating a coordinate as lying on a cell
/// boundary.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Tuning knobs for [`create_regions`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridOptions {
    /// Areas whose shorter edge is below this many meters are not split.
    pub threshold_m: f64,
    /// Number of divisions along the longer edge.
    pub divisions: u32,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            threshold_m: DEFAULT_THRESHOLD_M,
            divisions: DEFAULT_GRID_DIVISIONS,
        }
    }
}

/// Result of [`create_regions`].
#[derive(Debug, Clone, PartialEq)]
pub enum Partition {
    /// The area is small enough to be queried as a whole.
    Single {
        /// The query area itself.
        geometry: BoundingBox,
    },
    /// The area is split into grid cells.
    Grid(RegionGrid),
}

/// One cell of a [`RegionGrid`].
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Deterministic cell key.
    pub id: RegionId,
    /// Column index relative to the grid origin.
    pub lon_index: i64,
    /// Row index relative to the grid origin.
    pub lat_index: i64,
    /// Idealized cell extent, ignoring the query window.
    pub extent: BoundingBox,
    /// Cell extent clipped to the grid's bounding box.
    pub geometry: BoundingBox,
}

/// The parts of a grid that decide which cells and keys it produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    /// Western anchor, a multiple of `lon_d`.
    pub origin_lon: f64,
    /// Southern anchor, a multiple of `lat_d`.
    pub origin_lat: f64,
    /// Cell width in degrees.
    pub lon_d: f64,
    /// Cell height in degrees.
    pub lat_d: f64,
    /// The partitioned area.
    pub bbox: BoundingBox,
}

/// A partitioned bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGrid {
    /// Western anchor, a multiple of `lon_d`.
    pub origin_lon: f64,
    /// Southern anchor, a multiple of `lat_d`.
    pub origin_lat: f64,
    /// Cell width in degrees.
    pub lon_d: f64,
    /// Cell height in degrees.
    pub lat_d: f64,
    /// The partitioned area.
    pub bbox: BoundingBox,
    /// All cells intersecting `bbox`, keyed by id.
    pub regions: BTreeMap<RegionId, Region>,
    lon_span: (i64, i64),
    lat_span: (i64, i64),
}

impl RegionGrid {
    /// Build the grid with the given anchor and spacing, enumerating every
    /// cell that intersects `bbox`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::DegenerateSpacing`] if either spacing is not a
    /// positive finite number.
    pub fn new(
        origin_lon: f64,
        origin_lat: f64,
        lon_d: f64,
        lat_d: f64,
        bbox: BoundingBox,
    ) -> Result<Self, GeoError> {
        if !(lon_d.is_finite() && lat_d.is_finite() && lon_d > 0.0 && lat_d > 0.0) {
            return Err(GeoError::DegenerateSpacing { lon_d, lat_d });
        }

        let lon_span = index_span(bbox.min_lon, bbox.max_lon, origin_lon, lon_d);
        let lat_span = index_span(bbox.min_lat, bbox.max_lat, origin_lat, lat_d);

        let mut regions = BTreeMap::new();
        for lon_index in lon_span.0..=lon_span.1 {
            let (ext_min_lon, ext_max_lon) = cell_edges(origin_lon, lon_d, lon_index);
            let min_lon = if lon_index == lon_span.0 { bbox.min_lon } else { ext_min_lon };
            let max_lon = if lon_index == lon_span.1 { bbox.max_lon } else { ext_max_lon };

            for lat_index in lat_span.0..=lat_span.1 {
                let (ext_min_lat, ext_max_lat) = cell_edges(origin_lat, lat_d, lat_index);
                let min_lat = if lat_index == lat_span.0 { bbox.min_lat } else { ext_min_lat };
                let max_lat = if lat_index == lat_span.1 { bbox.max_lat } else { ext_max_lat };

                let id = RegionId::new(lon_index, lat_index, lon_d, lat_d);
                let region = Region {
                    id: id.clone(),
                    lon_index,
                    lat_index,
                    extent: BoundingBox {
                        min_lon: ext_min_lon,
                        min_lat: ext_min_lat,
                        max_lon: ext_max_lon,
                        max_lat: ext_max_lat,
                    },
                    geometry: BoundingBox {
                        min_lon,
                        min_lat,
                        max_lon,
                        max_lat,
                    },
                };
                regions.insert(id, region);
            }
        }

        Ok(Self {
            origin_lon,
            origin_lat,
            lon_d,
            lat_d,
            bbox,
            regions,
            lon_span,
            lat_span,
        })
    }

    /// Anchor, spacing, and area of this grid.
    pub const fn layout(&self) -> GridLayout {
        GridLayout {
            origin_lon: self.origin_lon,
            origin_lat: self.origin_lat,
            lon_d: self.lon_d,
            lat_d: self.lat_d,
            bbox: self.bbox,
        }
    }

    /// Whether `other` would produce exactly the same cells and keys.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.layout() == other.layout()
    }

    /// Stable key identifying this grid in region control frames.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{},{},{},{}",
            self.lon_d,
            self.lat_d,
            self.bbox.min_lon,
            self.bbox.min_lat,
            self.bbox.max_lon,
            self.bbox.max_lat
        )
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Cell containing the point, or `None` if it is outside the grid's
    /// bounding box. Points on the box's upper edges belong to the last
    /// row/column.
    pub fn region_at(&self, lon: f64, lat: f64) -> Option<&Region> {
        if !self.bbox.contains(lon, lat) {
            return None;
        }
        let lon_index = cell_index(lon, self.origin_lon, self.lon_d).clamp(self.lon_span.0, self.lon_span.1);
        let lat_index = cell_index(lat, self.origin_lat, self.lat_d).clamp(self.lat_span.0, self.lat_span.1);
        self.regions
            .get(&RegionId::new(lon_index, lat_index, self.lon_d, self.lat_d))
    }

    /// Cell a sample belongs to, using its map-matched position if present.
    pub fn region_for(&self, sample: &ProbeSample) -> Option<&Region> {
        let (lon, lat) = sample.position();
        self.region_at(lon, lat)
    }
}

/// Decide whether `bbox` needs partitioning and, if so, build its grid.
///
/// The area is left whole when its shorter edge is below
/// `options.threshold_m`. Otherwise the longer edge is divided into
/// `options.divisions` parts, the shorter edge gets the same spacing in
/// meters, and both spacings are snapped with [`round_to_nice_unit`].
///
/// # Errors
///
/// Returns [`GeoError`] for a non-positive threshold, zero divisions, or a
/// spacing that cannot be computed.
pub fn create_regions(bbox: &BoundingBox, options: &GridOptions) -> Result<Partition, GeoError> {
    if !(options.threshold_m.is_finite() && options.threshold_m > 0.0) {
        return Err(GeoError::InvalidThreshold(options.threshold_m));
    }
    if options.divisions == 0 {
        return Err(GeoError::InvalidDivisions);
    }

    let lat_ref = widest_parallel(bbox);
    let distance_lon = parallel_length(lat_ref, bbox.width());
    let distance_lat = distance(bbox.min_lon, bbox.min_lat, bbox.min_lon, bbox.max_lat);

    if distance_lon.min(distance_lat) < options.threshold_m {
        return Ok(Partition::Single { geometry: *bbox });
    }

    let divisions = f64::from(options.divisions);
    let (lon_d, lat_d) = if distance_lon >= distance_lat {
        let step_m = distance_lon / divisions;
        let (_, north) = destination(bbox.min_lon, lat_ref, step_m, 0.0);
        (bbox.width() / divisions, (north - lat_ref).abs())
    } else {
        let step_m = distance_lat / divisions;
        let (east, _) = destination(0.0, lat_ref, step_m, 90.0);
        (east.abs(), bbox.height() / divisions)
    };

    let lon_d = round_to_nice_unit(lon_d);
    let lat_d = round_to_nice_unit(lat_d);
    if !(lon_d > 0.0 && lat_d > 0.0) {
        return Err(GeoError::DegenerateSpacing { lon_d, lat_d });
    }

    let origin_lon = (bbox.min_lon / lon_d).floor() * lon_d;
    let origin_lat = (bbox.min_lat / lat_d).floor() * lat_d;

    RegionGrid::new(origin_lon, origin_lat, lon_d, lat_d, *bbox).map(Partition::Grid)
}

/// Snap a spacing to a "nice" value: one significant digit below 10, the
/// nearest integer from 10 upwards.
///
/// Powers of ten are applied by division for negative exponents so that,
/// e.g., `0.3` comes out as exactly `0.3`.
#[allow(clippy::cast_possible_truncation)]
pub fn round_to_nice_unit(value: f64) -> f64 {
    if !(value.is_finite() && value > 0.0) {
        return 0.0;
    }
    if value >= 10.0 {
        return value.round();
    }
    let exponent = value.log10().floor() as i32;
    if exponent < 0 {
        let scale = 10f64.powi(-exponent);
        (value * scale).round() / scale
    } else {
        let scale = 10f64.powi(exponent);
        (value / scale).round() * scale
    }
}

/// Split an area into equal sub-boxes no larger than `max_deg` on either axis.
///
/// Sub-box edges are shared exactly between neighbours and the outer edges
/// equal those of `bbox`.
///
/// # Errors
///
/// Returns [`GeoError::InvalidSubCell`] if `max_deg` is not positive.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn split_into_sub_cells(bbox: &BoundingBox, max_deg: f64) -> Result<Vec<BoundingBox>, GeoError> {
    if !(max_deg.is_finite() && max_deg > 0.0) {
        return Err(GeoError::InvalidSubCell(max_deg));
    }
    let cols = ((bbox.width() / max_deg).ceil() as usize).max(1);
    let rows = ((bbox.height() / max_deg).ceil() as usize).max(1);

    let lon_edges = split_edges(bbox.min_lon, bbox.max_lon, cols);
    let lat_edges = split_edges(bbox.min_lat, bbox.max_lat, rows);

    let mut cells = Vec::with_capacity(cols.saturating_mul(rows));
    for lon in lon_edges.windows(2) {
        for lat in lat_edges.windows(2) {
            if let ([min_lon, max_lon], [min_lat, max_lat]) = (lon, lat) {
                cells.push(BoundingBox {
                    min_lon: *min_lon,
                    min_lat: *min_lat,
                    max_lon: *max_lon,
                    max_lat: *max_lat,
                });
            }
        }
    }
    Ok(cells)
}

/// Latitude inside the box where a degree of longitude is longest.
fn widest_parallel(bbox: &BoundingBox) -> f64 {
    if bbox.min_lat <= 0.0 && bbox.max_lat >= 0.0 {
        0.0
    } else if bbox.min_lat > 0.0 {
        bbox.min_lat
    } else {
        bbox.max_lat
    }
}

/// East-west length in meters of `width_deg` degrees along a parallel.
///
/// Unlike [`distance`] this stays correct for spans wider than 180 degrees.
fn parallel_length(lat: f64, width_deg: f64) -> f64 {
    EARTH_RADIUS_M * lat.to_radians().cos() * width_deg.to_radians()
}

#[allow(clippy::cast_precision_loss)]
fn split_edges(min: f64, max: f64, parts: usize) -> Vec<f64> {
    let step = (max - min) / parts as f64;
    (0..=parts)
        .map(|k| if k == parts { max } else { min + step * k as f64 })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn cell_edges(origin: f64, spacing: f64, index: i64) -> (f64, f64) {
    let lower = origin + index as f64 * spacing;
    let upper = origin + index.saturating_add(1) as f64 * spacing;
    (lower, upper)
}

/// Index of the cell containing `coord`; boundary points go to the upper cell.
#[allow(clippy::cast_possible_truncation)]
fn cell_index(coord: f64, origin: f64, spacing: f64) -> i64 {
    let t = (coord - origin) / spacing;
    let nearest = t.round();
    if (t - nearest).abs() < BOUNDARY_EPSILON {
        nearest as i64
    } else {
        t.floor() as i64
    }
}

/// First and last cell index covering `[min, max]`; a cell that would start
/// exactly at `max` has no area and is excluded.
#[allow(clippy::cast_possible_truncation)]
fn index_span(min: f64, max: f64, origin: f64, spacing: f64) -> (i64, i64) {
    let first = cell_index(min, origin, spacing);
    let t = (max - origin) / spacing;
    let nearest = t.round();
    let last = if (t - nearest).abs() < BOUNDARY_EPSILON {
        (nearest as i64).saturating_sub(1)
    } else {
        t.floor() as i64
    };
    (first, last.max(first))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn sample(lon: f64, lat: f64) -> ProbeSample {
        ProbeSample {
            mo_id: String::from("car"),
            lat,
            lon,
            matched_lat: None,
            matched_lon: None,
            timestamp: 0,
            speed: 0.0,
            heading: 0.0,
            props: serde_json::Map::new(),
            info: None,
        }
    }

    fn grid_of(partition: Partition) -> Option<RegionGrid> {
        match partition {
            Partition::Grid(grid) => Some(grid),
            Partition::Single { .. } => None,
        }
    }

    fn tokyo_grid() -> Option<RegionGrid> {
        let bbox = BoundingBox::new(139.7, 35.6, 140.0, 35.9);
        RegionGrid::new(139.7, 35.6, 0.1, 0.1, bbox).ok()
    }

    #[test]
    fn small_area_is_single() {
        let bbox = BoundingBox::new(139.70, 35.60, 139.90, 35.75);
        let partition = create_regions(&bbox, &GridOptions::default());
        assert_eq!(partition, Ok(Partition::Single { geometry: bbox }));
    }

    #[test]
    fn narrow_strip_is_single() {
        // Long but thin: the shorter edge decides.
        let bbox = BoundingBox::new(0.0, 0.0, 20.0, 0.5);
        let partition = create_regions(&bbox, &GridOptions::default());
        assert_eq!(partition, Ok(Partition::Single { geometry: bbox }));
    }

    #[test]
    fn two_degree_square_is_grid() {
        let bbox = BoundingBox::new(-1.0, -1.0, 1.0, 1.0);
        let grid = create_regions(&bbox, &GridOptions::default()).ok().and_then(grid_of);
        assert!(grid.is_some());
        let grid = grid.unwrap_or_else(|| unreachable_grid(bbox));
        assert!(grid.len() > 1);
        assert!((grid.lon_d - 0.3).abs() < 1e-12 || (grid.lon_d - 0.2).abs() < 1e-12);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let bbox = BoundingBox::new(-1.0, -1.0, 1.0, 1.0);
        let zero = GridOptions { threshold_m: 0.0, ..GridOptions::default() };
        assert_eq!(create_regions(&bbox, &zero), Err(GeoError::InvalidThreshold(0.0)));
        let none = GridOptions { divisions: 0, ..GridOptions::default() };
        assert_eq!(create_regions(&bbox, &none), Err(GeoError::InvalidDivisions));
    }

    #[test]
    fn cells_tile_the_bbox() {
        for bbox in [
            BoundingBox::new(-1.0, -1.0, 1.0, 1.0),
            BoundingBox::new(139.1, 35.05, 141.37, 36.93),
            BoundingBox::new(-75.3, 38.2, -70.05, 42.8),
            BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
        ] {
            let grid = create_regions(&bbox, &GridOptions::default())
                .ok()
                .and_then(grid_of)
                .unwrap_or_else(|| unreachable_grid(bbox));
            assert_tiles(&grid);
        }
    }

    fn assert_tiles(grid: &RegionGrid) {
        let bbox = grid.bbox;
        let total: f64 = grid
            .regions
            .values()
            .map(|r| r.geometry.width() * r.geometry.height())
            .sum();
        let area = bbox.width() * bbox.height();
        assert!((total - area).abs() < area * 1e-9, "area {total} vs {area}");

        let cells: Vec<&Region> = grid.regions.values().collect();
        for (i, a) in cells.iter().enumerate() {
            assert!(a.geometry.width() > 0.0 && a.geometry.height() > 0.0);
            assert!(a.geometry.min_lon >= bbox.min_lon && a.geometry.max_lon <= bbox.max_lon);
            assert!(a.geometry.min_lat >= bbox.min_lat && a.geometry.max_lat <= bbox.max_lat);
            for b in cells.iter().skip(i + 1) {
                assert!(a.geometry.intersection(&b.geometry).is_none(), "{} overlaps {}", a.id, b.id);
            }
        }
    }

    fn unreachable_grid(bbox: BoundingBox) -> RegionGrid {
        panic!("expected a grid for {bbox:?}")
    }

    #[test]
    fn region_ids_are_stable_across_pans() {
        let a = create_regions(&BoundingBox::new(0.0, 0.0, 3.0, 2.0), &GridOptions::default())
            .ok()
            .and_then(grid_of);
        let b = create_regions(&BoundingBox::new(0.02, 0.03, 3.02, 2.03), &GridOptions::default())
            .ok()
            .and_then(grid_of);
        let (Some(a), Some(b)) = (a, b) else {
            panic!("expected grids");
        };
        assert!((a.lon_d - 0.4).abs() < 1e-12);
        assert!((b.lon_d - 0.4).abs() < 1e-12);
        assert!((a.lat_d - b.lat_d).abs() < 1e-12);
        let id_a = a.region_at(1.05, 1.05).map(|r| r.id.clone());
        let id_b = b.region_at(1.05, 1.05).map(|r| r.id.clone());
        assert!(id_a.is_some());
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn point_lookup_matches_scenario() {
        let grid = tokyo_grid();
        assert!(grid.is_some());
        let Some(grid) = grid else { return };

        let region = grid.region_for(&sample(139.767, 35.681));
        assert_eq!(region.map(|r| r.id.as_str()), Some("0:0:0.1:0.1"));

        let next = grid.region_for(&sample(139.8, 35.681));
        assert_eq!(next.map(|r| r.lon_index), Some(1));
        assert_eq!(next.map(|r| r.id.as_str()), Some("1:0:0.1:0.1"));
    }

    #[test]
    fn lower_edges_belong_to_their_cell() {
        let Some(grid) = tokyo_grid() else { panic!("grid") };
        for region in grid.regions.values() {
            let found = grid.region_at(region.geometry.min_lon, region.geometry.min_lat);
            assert_eq!(found.map(|r| &r.id), Some(&region.id));

            let mid_lon = (region.geometry.min_lon + region.geometry.max_lon) / 2.0;
            let mid_lat = (region.geometry.min_lat + region.geometry.max_lat) / 2.0;
            assert_eq!(grid.region_at(mid_lon, mid_lat).map(|r| &r.id), Some(&region.id));
        }
    }

    #[test]
    fn upper_bbox_edge_stays_inside_grid() {
        let Some(grid) = tokyo_grid() else { panic!("grid") };
        let corner = grid.region_at(140.0, 35.9);
        assert!(corner.is_some());
        assert!(grid.region_at(140.01, 35.9).is_none());
    }

    #[test]
    fn matched_position_decides_region() {
        let Some(grid) = tokyo_grid() else { panic!("grid") };
        let mut probe = sample(139.71, 35.61);
        probe.matched_lon = Some(139.85);
        probe.matched_lat = Some(35.61);
        assert_eq!(grid.region_for(&probe).map(|r| r.lon_index), Some(1));
    }

    #[test]
    fn nice_units() {
        let cases = [
            (0.25, 0.3),
            (0.034, 0.03),
            (0.096, 0.1),
            (1.4, 1.0),
            (7.6, 8.0),
            (12.4, 12.0),
            (45.5, 46.0),
        ];
        for (input, expected) in cases {
            let got = round_to_nice_unit(input);
            assert!((got - expected).abs() < 1e-12, "{input} -> {got}");
        }
        assert!(round_to_nice_unit(0.0).abs() < f64::EPSILON);
        assert!(round_to_nice_unit(f64::NAN).abs() < f64::EPSILON);
    }

    #[test]
    fn sub_cells_cover_cell() {
        let cell = BoundingBox::new(10.0, 20.0, 12.5, 21.0);
        let subs = split_into_sub_cells(&cell, 1.0).unwrap_or_default();
        assert_eq!(subs.len(), 3);
        for sub in &subs {
            assert!(sub.width() <= 1.0 + 1e-12);
            assert!(sub.height() <= 1.0 + 1e-12);
        }
        let area: f64 = subs.iter().map(|s| s.width() * s.height()).sum();
        assert!((area - 2.5).abs() < 1e-9);
        assert!(split_into_sub_cells(&cell, 0.0).is_err());
    }

    #[test]
    fn small_cell_is_one_sub_cell() {
        let cell = BoundingBox::new(0.0, 0.0, 0.3, 0.3);
        assert_eq!(split_into_sub_cells(&cell, 1.0), Ok(vec![cell]));
    }

    #[test]
    fn same_layout_detects_changes() {
        let Some(a) = tokyo_grid() else { panic!("grid") };
        let b = a.clone();
        assert!(a.same_layout(&b));
        let moved = RegionGrid::new(139.7, 35.6, 0.1, 0.1, BoundingBox::new(139.7, 35.6, 140.1, 35.9));
        assert!(moved.is_ok_and(|m| !a.same_layout(&m)));
    }
}
