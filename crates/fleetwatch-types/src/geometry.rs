//! Axis-aligned longitude/latitude rectangles.
//!
//! A [`BoundingBox`] is always normalized: `min <= max` on both axes,
//! latitudes clamped to `[-90, 90]`, and longitudes wrapped into
//! `[-180, 180]`. A box that spans the whole globe, or that crosses the
//! antimeridian once wrapped, collapses to the full `[-180, 180]` range.

use serde::{Deserialize, Serialize};

/// Errors raised when building a bounding box from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// A coordinate was NaN or infinite.
    #[error("non-finite coordinate in bounding box")]
    NonFinite,
}

/// Normalized longitude/latitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBoundingBox")]
pub struct BoundingBox {
    /// Western edge in degrees.
    pub min_lon: f64,
    /// Southern edge in degrees.
    pub min_lat: f64,
    /// Eastern edge in degrees.
    pub max_lon: f64,
    /// Northern edge in degrees.
    pub max_lat: f64,
}

/// Unvalidated wire form accepted from clients.
#[derive(Deserialize)]
struct RawBoundingBox {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl TryFrom<RawBoundingBox> for BoundingBox {
    type Error = GeometryError;

    fn try_from(raw: RawBoundingBox) -> Result<Self, Self::Error> {
        Self::try_new(raw.min_lon, raw.min_lat, raw.max_lon, raw.max_lat)
    }
}

impl BoundingBox {
    /// The whole globe.
    pub const WORLD: Self = Self {
        min_lon: -180.0,
        min_lat: -90.0,
        max_lon: 180.0,
        max_lat: 90.0,
    };

    /// Build a normalized box from two corners given in any order.
    ///
    /// Non-finite inputs are not checked here; use [`BoundingBox::try_new`]
    /// for untrusted coordinates.
    pub fn new(lon_a: f64, lat_a: f64, lon_b: f64, lat_b: f64) -> Self {
        let (min_lat, max_lat) = ordered(lat_a.clamp(-90.0, 90.0), lat_b.clamp(-90.0, 90.0));
        let (min_lon, max_lon) = normalize_lon_span(lon_a, lon_b);
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Build a normalized box, rejecting NaN and infinite coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::NonFinite`] if any coordinate is not finite.
    pub fn try_new(lon_a: f64, lat_a: f64, lon_b: f64, lat_b: f64) -> Result<Self, GeometryError> {
        if [lon_a, lat_a, lon_b, lat_b].iter().all(|c| c.is_finite()) {
            Ok(Self::new(lon_a, lat_a, lon_b, lat_b))
        } else {
            Err(GeometryError::NonFinite)
        }
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Whether the point lies inside the box (edges included).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Intersection of two boxes, or `None` if they do not overlap with
    /// positive area.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let min_lon = self.min_lon.max(other.min_lon);
        let max_lon = self.max_lon.min(other.max_lon);
        let min_lat = self.min_lat.max(other.min_lat);
        let max_lat = self.max_lat.min(other.max_lat);
        (min_lon < max_lon && min_lat < max_lat).then_some(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Grow the box so that it includes the given point.
    pub fn expand_to(&mut self, lon: f64, lat: f64) {
        self.min_lon = self.min_lon.min(lon);
        self.max_lon = self.max_lon.max(lon);
        self.min_lat = self.min_lat.min(lat);
        self.max_lat = self.max_lat.max(lat);
    }

    /// Degenerate box covering a single point.
    pub const fn point(lon: f64, lat: f64) -> Self {
        Self {
            min_lon: lon,
            min_lat: lat,
            max_lon: lon,
            max_lat: lat,
        }
    }
}

/// Mean position of a group of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Center {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Wrap a longitude into `[-180, 180]`, keeping `180` itself.
fn wrap_lon(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

fn normalize_lon_span(a: f64, b: f64) -> (f64, f64) {
    let (lo, hi) = ordered(a, b);
    if hi - lo >= 360.0 {
        return (-180.0, 180.0);
    }
    let (lo, hi) = (wrap_lon(lo), wrap_lon(hi));
    // Crossing the antimeridian collapses to the full range.
    if lo > hi { (-180.0, 180.0) } else { (lo, hi) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn corners_are_ordered() {
        let b = BoundingBox::new(10.0, 5.0, -10.0, -5.0);
        assert!(approx(b.min_lon, -10.0));
        assert!(approx(b.max_lon, 10.0));
        assert!(approx(b.min_lat, -5.0));
        assert!(approx(b.max_lat, 5.0));
    }

    #[test]
    fn latitudes_are_clamped() {
        let b = BoundingBox::new(0.0, -120.0, 1.0, 95.0);
        assert!(approx(b.min_lat, -90.0));
        assert!(approx(b.max_lat, 90.0));
    }

    #[test]
    fn wide_span_collapses_to_world() {
        let b = BoundingBox::new(-200.0, 0.0, 200.0, 1.0);
        assert!(approx(b.min_lon, -180.0));
        assert!(approx(b.max_lon, 180.0));
    }

    #[test]
    fn shifted_span_wraps() {
        let b = BoundingBox::new(190.0, 0.0, 200.0, 1.0);
        assert!(approx(b.min_lon, -170.0));
        assert!(approx(b.max_lon, -160.0));
    }

    #[test]
    fn antimeridian_crossing_collapses() {
        let b = BoundingBox::new(170.0, 0.0, 190.0, 1.0);
        assert!(approx(b.min_lon, -180.0));
        assert!(approx(b.max_lon, 180.0));
    }

    #[test]
    fn try_new_rejects_non_finite() {
        assert_eq!(
            BoundingBox::try_new(f64::NAN, 0.0, 1.0, 1.0),
            Err(GeometryError::NonFinite)
        );
        assert!(BoundingBox::try_new(0.0, 0.0, f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn deserialize_normalizes() {
        let json = r#"{"min_lon":2,"min_lat":3,"max_lon":1,"max_lat":-1}"#;
        let b: BoundingBox = serde_json::from_str(json).unwrap_or(BoundingBox::WORLD);
        assert!(approx(b.min_lon, 1.0));
        assert!(approx(b.max_lat, 3.0));
    }

    #[test]
    fn intersection_requires_area() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(1.0, 0.0, 2.0, 1.0);
        assert!(a.intersection(&b).is_none());

        let c = BoundingBox::new(0.5, 0.5, 2.0, 2.0);
        let i = a.intersection(&c);
        assert_eq!(i, Some(BoundingBox::new(0.5, 0.5, 1.0, 1.0)));
    }
}
