//! Geographic <-> local metric offset math.
//!
//! Flat-earth style decomposition into a north/south leg and an east/west
//! leg. Valid for offsets of tens of kilometres; not a geodesic solver.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use crate::types::{GeoCoordinate, Translation, EARTH_RADIUS_M};

/// Below this the isometric-latitude delta is treated as a constant-latitude line.
const ISOMETRIC_EPSILON: f64 = 1e-12;

/// Below this the stretch factor is treated as a pole, where east/west has no meaning.
const STRETCH_EPSILON: f64 = 1e-12;

/// Great-circle distance in metres, ignoring altitude.
pub fn distance(a: &GeoCoordinate, b: &GeoCoordinate) -> f64 {
    haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude)
}

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Metric offset from `from` to `to`.
///
/// The north/south leg is measured along `to`'s meridian and the east/west
/// leg along `from`'s parallel, through the corner point
/// `(from.latitude, to.longitude)`.
pub fn translation(from: &GeoCoordinate, to: &GeoCoordinate) -> Translation {
    let corner_lat = from.latitude;
    let corner_lon = to.longitude;

    let ns = haversine_distance(corner_lat, corner_lon, to.latitude, to.longitude);
    let north_south = if to.latitude > corner_lat { ns } else { -ns };

    let ew = haversine_distance(from.latitude, from.longitude, corner_lat, corner_lon);
    let east_west = if from.longitude <= corner_lon { ew } else { -ew };

    Translation {
        north_south,
        east_west,
        altitude: to.altitude - from.altitude,
    }
}

/// Offset `from` by `translation`.
///
/// Each axis is applied as its own bearing offset from `from`; the result
/// takes latitude from the northward offset and longitude from the eastward
/// one. Accuracy and timestamp are inherited from `from`.
pub fn apply(from: &GeoCoordinate, translation: &Translation) -> GeoCoordinate {
    let (lat, _) = offset_by_bearing(from.latitude, from.longitude, 0.0, translation.north_south);
    let (_, lon) = offset_by_bearing(from.latitude, from.longitude, 90.0, translation.east_west);

    GeoCoordinate {
        latitude: lat,
        longitude: lon,
        altitude: from.altitude + translation.altitude,
        horizontal_accuracy: from.horizontal_accuracy,
        vertical_accuracy: from.vertical_accuracy,
        timestamp: from.timestamp,
    }
}

/// Move `distance_m` metres along `bearing_deg` using the conformal
/// (isometric-latitude) offset. Returns `(latitude, longitude)` in degrees.
pub fn offset_by_bearing(lat_deg: f64, lon_deg: f64, bearing_deg: f64, distance_m: f64) -> (f64, f64) {
    let lat1 = lat_deg.to_radians();
    let lon1 = lon_deg.to_radians();
    let bearing = bearing_deg.to_radians();
    let fraction = distance_m / EARTH_RADIUS_M;

    let mut lat2 = lat1 + fraction * bearing.cos();
    let d_lat = lat2 - lat1;

    let d_phi = isometric_delta(lat1, lat2);
    let q = match d_phi {
        Some(d_phi) if d_phi.abs() > ISOMETRIC_EPSILON => d_lat / d_phi,
        _ => lat1.cos(),
    };

    let east_component = fraction * bearing.sin();
    let d_lon = if q.is_finite() && q.abs() > STRETCH_EPSILON {
        east_component / q
    } else {
        0.0
    };

    if lat2.abs() > FRAC_PI_2 {
        lat2 = lat2.signum() * (PI - lat2.abs());
    }

    let lon2 = normalize_longitude(lon1 + d_lon);
    (lat2.to_degrees(), lon2.to_degrees())
}

/// ln(tan(lat2/2 + π/4) / tan(lat1/2 + π/4)), or `None` past a pole.
fn isometric_delta(lat1: f64, lat2: f64) -> Option<f64> {
    let t1 = (lat1 / 2.0 + FRAC_PI_4).tan();
    let t2 = (lat2 / 2.0 + FRAC_PI_4).tan();
    let ratio = t2 / t1;
    if ratio.is_finite() && ratio > 0.0 {
        Some(ratio.ln())
    } else {
        None
    }
}

/// Wrap radians into (-π, π].
fn normalize_longitude(lon: f64) -> f64 {
    PI - (PI - lon).rem_euclid(2.0 * PI)
}
