use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Mean earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("latitude must be a finite number in [-90, 90], got {0}")]
    InvalidLatitude(f64),
    #[error("longitude must be a finite number in [-180, 180], got {0}")]
    InvalidLongitude(f64),
}

/// A validated WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "RawPoint")]
pub struct GeoPoint {
    #[schema(example = 23.8103)]
    latitude: f64,
    #[schema(example = 90.4125)]
    longitude: f64,
}

#[derive(Deserialize)]
struct RawPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawPoint> for GeoPoint {
    type Error = GeoError;

    fn try_from(raw: RawPoint) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self, other)
    }
}

/// Haversine distance between two points, in meters.
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn distance_to_self_is_zero() {
        for (lat, lon) in [(0.0, 0.0), (23.8103, 90.4125), (-90.0, 180.0), (51.5, -0.12)] {
            let p = point(lat, lon);
            assert_eq!(haversine_distance(&p, &p), 0.0);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let dhaka = point(23.8103, 90.4125);
        let london = point(51.5074, -0.1278);
        assert_eq!(
            haversine_distance(&dhaka, &london),
            haversine_distance(&london, &dhaka)
        );
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = point(0.0, 0.0).distance_to(&point(1.0, 0.0));
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        assert_eq!(GeoPoint::new(91.0, 0.0), Err(GeoError::InvalidLatitude(91.0)));
        assert_eq!(
            GeoPoint::new(0.0, -180.5),
            Err(GeoError::InvalidLongitude(-180.5))
        );
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn deserialize_validates() {
        let ok: GeoPoint = serde_json::from_str(r#"{"latitude": 10.0, "longitude": 20.0}"#).unwrap();
        assert_eq!(ok.latitude, 10.0);

        let bad = serde_json::from_str::<GeoPoint>(r#"{"latitude": 100.0, "longitude": 20.0}"#);
        assert!(bad.is_err());
    }
}
