//! Geographic coordinate model

use haversine::{Location as HaversineLocation, Units, distance};
use serde::{Deserialize, Serialize};

/// A point on the globe in decimal degrees
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to another coordinate in kilometers
    #[must_use]
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        let from = HaversineLocation {
            latitude: self.latitude,
            longitude: self.longitude,
        };
        let to = HaversineLocation {
            latitude: other.latitude,
            longitude: other.longitude,
        };
        distance(from, to, Units::Kilometers)
    }

    /// Format coordinate as a display string
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }

    /// Round coordinates for cache key generation
    #[must_use]
    pub fn rounded_coordinates(&self, precision: u32) -> (f64, f64) {
        let multiplier = 10_f64.powi(i32::try_from(precision).unwrap_or(4));
        let lat = (self.latitude * multiplier).round() / multiplier;
        let lon = (self.longitude * multiplier).round() / multiplier;
        (lat, lon)
    }

    /// Stable key for route caching, rounded so nearby lookups collapse
    #[must_use]
    pub fn to_key(&self) -> String {
        let (lat, lon) = self.rounded_coordinates(3);
        format!("{lat:.3},{lon:.3}")
    }
}
