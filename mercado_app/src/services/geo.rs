// mercado_app/src/services/geo.rs

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
  pub lat: f64,
  pub lng: f64,
}

impl GeoPoint {
  pub fn new(lat: f64, lng: f64) -> Self {
    Self { lat, lng }
  }

  pub fn validate(&self) -> Result<()> {
    let lat_ok = self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat);
    let lng_ok = self.lng.is_finite() && (-180.0..=180.0).contains(&self.lng);
    if lat_ok && lng_ok {
      Ok(())
    } else {
      Err(AppError::Validation(format!(
        "Invalid coordinates ({}, {})",
        self.lat, self.lng
      )))
    }
  }

  /// Great-circle distance (haversine).
  pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
    let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lng = (other.lng - self.lng).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
  }
}

/// Builds a point from nullable columns.
pub fn point_from(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
  match (lat, lng) {
    (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_distance_for_same_point() {
    let p = GeoPoint::new(-34.6037, -58.3816);
    assert!(p.distance_meters(&p).abs() < 1e-6);
  }

  #[test]
  fn one_degree_of_latitude_is_about_111_km() {
    let a = GeoPoint::new(0.0, 0.0);
    let b = GeoPoint::new(1.0, 0.0);
    let d = a.distance_meters(&b);
    assert!((d - 111_195.0).abs() < 100.0, "got {d}");
  }

  #[test]
  fn rejects_out_of_range() {
    assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
    assert!(GeoPoint::new(0.0, f64::NAN).validate().is_err());
    assert!(GeoPoint::new(-90.0, 180.0).validate().is_ok());
  }
}
