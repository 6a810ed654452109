//! Coordinate value type and great-circle distance.
//!
//! # Invariants
//! - A `Coordinate` that passed `validate()` has finite latitude in `[-90, 90]`
//!   and finite longitude in `[-180, 180]`.
//! - `haversine_distance_m` is symmetric and returns `0.0` for identical points.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

const LATITUDE_LIMIT: f64 = 90.0;
const LONGITUDE_LIMIT: f64 = 180.0;

/// WGS84-style point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Checks range and finiteness of both components.
    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !self.latitude.is_finite() || self.latitude.abs() > LATITUDE_LIMIT {
            return Err(CoordinateError::LatitudeOutOfRange(self.latitude));
        }
        if !self.longitude.is_finite() || self.longitude.abs() > LONGITUDE_LIMIT {
            return Err(CoordinateError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance_m(*self, *other)
    }
}

/// Coordinate validation errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateError {
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
}

impl Display for CoordinateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LatitudeOutOfRange(value) => {
                write!(f, "latitude {value} is outside [-90, 90]")
            }
            Self::LongitudeOutOfRange(value) => {
                write!(f, "longitude {value} is outside [-180, 180]")
            }
        }
    }
}

impl Error for CoordinateError {}

/// Haversine great-circle distance between two points, in meters.
pub fn haversine_distance_m(from: Coordinate, to: Coordinate) -> f64 {
    let phi_1 = from.latitude.to_radians();
    let phi_2 = to.latitude.to_radians();
    let delta_phi = (to.latitude - from.latitude).to_radians();
    let delta_lambda = (to.longitude - from.longitude).to_radians();

    let half_phi = (delta_phi / 2.0).sin();
    let half_lambda = (delta_lambda / 2.0).sin();
    let a = half_phi * half_phi + phi_1.cos() * phi_2.cos() * half_lambda * half_lambda;
    // Rounding can push `a` a hair above 1.0 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
