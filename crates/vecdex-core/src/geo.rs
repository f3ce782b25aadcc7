//! Geo encoding: lat/lon to ECEF unit vectors, and distance conversions
//! between the unit-sphere vector space and meters (§6).

use crate::error::{Error, Result};

/// Mean Earth radius in meters, used for unit-sphere distance conversion.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Validates a latitude/longitude pair against the standard ranges.
///
/// # Errors
///
/// Returns [`Error::GeoQueryInvalid`] outside `[-90, 90]` / `[-180, 180]`.
pub fn validate_lat_lon(lat: f64, lon: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(Error::GeoQueryInvalid(format!(
            "latitude {lat} out of range [-90, 90]"
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(Error::GeoQueryInvalid(format!(
            "longitude {lon} out of range [-180, 180]"
        )));
    }
    Ok(())
}

/// Converts a validated `(lat, lon)` pair (degrees) to an ECEF unit vector:
/// `(cos(lat)cos(lon), cos(lat)sin(lon), sin(lat))`, treating Earth as a
/// unit sphere.
#[must_use]
pub fn to_ecef(lat: f64, lon: f64) -> [f32; 3] {
    let lat_r = lat.to_radians();
    let lon_r = lon.to_radians();
    [
        (lat_r.cos() * lon_r.cos()) as f32,
        (lat_r.cos() * lon_r.sin()) as f32,
        lat_r.sin() as f32,
    ]
}

/// Great-circle (Haversine) distance between two `(lat, lon)` pairs, in
/// meters. Used to post-filter KNN candidates returned via the ECEF
/// unit-sphere approximation.
#[must_use]
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1_r, lat2_r) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2_r - lat1_r;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}
