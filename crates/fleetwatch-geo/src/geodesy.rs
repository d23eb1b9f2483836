//! Great-circle helpers on a spherical Earth.
//!
//! Both functions use the haversine formulation with the WGS-84 equatorial
//! radius. Bearings are degrees clockwise from north.

/// Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Great-circle distance in meters between two points.
pub fn distance(lon_a: f64, lat_a: f64, lon_b: f64, lat_b: f64) -> f64 {
    let phi_a = lat_a.to_radians();
    let phi_b = lat_b.to_radians();
    let d_phi = (lat_b - lat_a).to_radians();
    let d_lambda = (lon_b - lon_a).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Point reached by travelling `meters` from `(lon, lat)` along the initial
/// bearing `bearing_deg`. Returns `(lon, lat)` with longitude in `[-180, 180)`.
pub fn destination(lon: f64, lat: f64, meters: f64, bearing_deg: f64) -> (f64, f64) {
    let delta = meters / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi = lat.to_radians();
    let lambda = lon.to_radians();

    let phi_out = (phi.sin() * delta.cos() + phi.cos() * delta.sin() * theta.cos()).asin();
    let lambda_out = lambda
        + (theta.sin() * delta.sin() * phi.cos()).atan2(delta.cos() - phi.sin() * phi_out.sin());

    let lon_out = (lambda_out.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    (lon_out, phi_out.to_degrees())
}
