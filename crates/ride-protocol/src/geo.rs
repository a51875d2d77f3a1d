//! Coordinates and named places.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude, between -90 and 90.
    pub lat: f64,
    /// Longitude, between -180 and 180.
    pub lng: f64,
}

impl GeoPoint {
    /// Builds a point without validating it.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Checks that both components are finite and in range.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] naming the first component that fails.
    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(CoordinateError::Latitude(self.lat));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(CoordinateError::Longitude(self.lng));
        }
        Ok(())
    }
}

/// A pickup or drop-off location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Human-readable address.
    #[serde(default)]
    pub address: String,
}

impl Place {
    /// Builds a place.
    #[must_use]
    pub fn new(lat: f64, lng: f64, address: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            address: address.into(),
        }
    }

    /// Coordinates of the place.
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Rejected coordinate component.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    /// Latitude was not finite or outside [-90, 90].
    #[error("latitude {0} is out of range")]
    Latitude(f64),
    /// Longitude was not finite or outside [-180, 180].
    #[error("longitude {0} is out of range")]
    Longitude(f64),
}
