//! Geographic helpers for location corroboration.

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A validated WGS-84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    /// Latitude in degrees, -90..=90.
    pub lat: f64,
    /// Longitude in degrees, -180..=180.
    pub lon: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "lng", alias = "longitude")]
    lon: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = VerifyError;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.lat, raw.lon)
    }
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range or non-finite coordinates.
    pub fn new(lat: f64, lon: f64) -> Result<Self, VerifyError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(VerifyError::invalid_input(format!("latitude {} out of range", lat)));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(VerifyError::invalid_input(format!("longitude {} out of range", lon)));
        }
        Ok(Self { lat, lon })
    }

    /// Great-circle distance in meters (haversine).
    #[must_use]
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }

    /// Point reached by travelling `distance_m` along `bearing_deg` from here.
    #[must_use]
    pub fn offset(&self, bearing_deg: f64, distance_m: f64) -> GeoPoint {
        let delta = distance_m / EARTH_RADIUS_M;
        let theta = bearing_deg.to_radians();
        let lat1 = self.lat.to_radians();
        let lon1 = self.lon.to_radians();

        let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
        let lon2 = lon1
            + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

        // Normalize longitude into -180..=180.
        let lon_deg = (lon2.to_degrees() + 540.0) % 360.0 - 180.0;
        GeoPoint {
            lat: lat2.to_degrees().clamp(-90.0, 90.0),
            lon: lon_deg,
        }
    }
}

/// Geographic centroid of a set of points, via the mean unit vector.
///
/// Returns `None` for an empty set or antipodal sets with no defined mean.
#[must_use]
pub fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let (mut x, mut y, mut z) = (0.0f64, 0.0f64, 0.0f64);
    for p in points {
        let (lat, lon) = (p.lat.to_radians(), p.lon.to_radians());
        x += lat.cos() * lon.cos();
        y += lat.cos() * lon.sin();
        z += lat.sin();
    }
    let n = points.len() as f64;
    let (x, y, z) = (x / n, y / n, z / n);
    let hyp = (x * x + y * y).sqrt();
    if hyp < 1e-12 && z.abs() < 1e-12 {
        return None;
    }
    Some(GeoPoint {
        lat: z.atan2(hyp).to_degrees(),
        lon: y.atan2(x).to_degrees(),
    })
}
