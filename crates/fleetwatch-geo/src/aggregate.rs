//! Per-cell aggregation of probe samples.
//!
//! [`aggregate`] buckets samples into the cells of a [`RegionGrid`] and
//! computes a count, centroid, and tight bounding box per touched cell.
//! Cells whose fetch failed are represented by a group with `count == -1`,
//! and [`create_summary`] makes that unknown contagious: a single failed
//! cell turns the whole summary's count into `-1` instead of silently
//! under-reporting.

use std::collections::BTreeMap;

use fleetwatch_types::{BoundingBox, Center, DeviceInfo, GroupDevice, ProbeSample, RegionId};
use tracing::debug;

use crate::grid::{Region, RegionGrid};

/// Count marker for a cell whose contents are unknown.
pub const UNKNOWN_COUNT: i64 = -1;

/// Samples of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationGroup {
    /// The cell.
    pub region: Region,
    /// Samples in the cell; `None` if the fetch failed.
    pub probes: Option<Vec<ProbeSample>>,
    /// Tight box around the samples, distinct from the cell geometry.
    pub valid_geometry: Option<BoundingBox>,
    /// Mean sample position.
    pub center: Option<Center>,
    /// Number of samples, or [`UNKNOWN_COUNT`].
    pub count: i64,
}

impl AggregationGroup {
    /// Group standing in for a cell whose fetch failed.
    pub const fn failed(region: Region) -> Self {
        Self {
            region,
            probes: None,
            valid_geometry: None,
            center: None,
            count: UNKNOWN_COUNT,
        }
    }

    /// Whether the cell's contents are unknown.
    pub const fn is_unknown(&self) -> bool {
        self.count == UNKNOWN_COUNT
    }
}

/// Aggregation result for one grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Total samples, or [`UNKNOWN_COUNT`] if any group is unknown.
    pub count: i64,
    /// One group per touched or failed cell, ordered by cell id.
    pub groups: Vec<AggregationGroup>,
}

struct Accumulator<'a> {
    region: &'a Region,
    probes: Vec<ProbeSample>,
    sum_lon: f64,
    sum_lat: f64,
    bounds: BoundingBox,
}

/// Bucket samples into the grid's cells.
///
/// The returned [`Summary::count`] is the number of samples bucketed, which
/// can be less than `samples.len()`: samples outside the grid's bounding box
/// are skipped and counted nowhere.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn aggregate(grid: &RegionGrid, samples: Vec<ProbeSample>) -> Summary {
    let mut cells: BTreeMap<&RegionId, Accumulator<'_>> = BTreeMap::new();
    let mut skipped: usize = 0;

    for sample in samples {
        let Some(region) = grid.region_for(&sample) else {
            skipped = skipped.saturating_add(1);
            continue;
        };
        let (lon, lat) = sample.position();
        let cell = cells.entry(&region.id).or_insert_with(|| Accumulator {
            region,
            probes: Vec::new(),
            sum_lon: 0.0,
            sum_lat: 0.0,
            bounds: BoundingBox::point(lon, lat),
        });
        cell.sum_lon += lon;
        cell.sum_lat += lat;
        cell.bounds.expand_to(lon, lat);
        cell.probes.push(sample);
    }

    if skipped > 0 {
        debug!(skipped, grid = %grid.key(), "samples outside grid ignored");
    }

    let groups = cells
        .into_values()
        .map(|cell| {
            let n = cell.probes.len() as f64;
            AggregationGroup {
                region: cell.region.clone(),
                count: cell.probes.len() as i64,
                center: Some(Center {
                    lon: cell.sum_lon / n,
                    lat: cell.sum_lat / n,
                }),
                valid_geometry: Some(cell.bounds),
                probes: Some(cell.probes),
            }
        })
        .collect();

    create_summary(groups)
}

/// Total the groups, propagating [`UNKNOWN_COUNT`].
pub fn create_summary(groups: Vec<AggregationGroup>) -> Summary {
    let count = if groups.iter().any(AggregationGroup::is_unknown) {
        UNKNOWN_COUNT
    } else {
        groups.iter().fold(0_i64, |acc, g| acc.saturating_add(g.count))
    };
    Summary { count, groups }
}

/// Replace the groups of failed cells with unknown groups and re-total.
///
/// Samples that did arrive for a failed cell are discarded: a partially
/// fetched cell is reported as unknown rather than under-counted.
pub fn merge_failures(summary: Summary, failed: Vec<Region>) -> Summary {
    if failed.is_empty() {
        return summary;
    }
    let mut groups: BTreeMap<RegionId, AggregationGroup> = summary
        .groups
        .into_iter()
        .map(|g| (g.region.id.clone(), g))
        .collect();
    for region in failed {
        groups.insert(region.id.clone(), AggregationGroup::failed(region));
    }
    create_summary(groups.into_values().collect())
}

/// Flatten a summary into its wire form.
pub fn convert_to_device_info(summary: &Summary) -> DeviceInfo {
    DeviceInfo {
        count: summary.count,
        devices: summary
            .groups
            .iter()
            .map(|group| GroupDevice {
                aggregated: true,
                group_id: group.region.id.clone(),
                geometry: group.region.geometry,
                valid_geometry: group.valid_geometry,
                center: group.center,
                count: group.count,
                alerts: None,
            })
            .collect(),
    }
}
