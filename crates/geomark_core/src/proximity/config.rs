//! Proximity tuning knobs.

use crate::ports::{LocationAccuracy, LocationRequest};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_RADIUS_M: f64 = 100.0;
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MIN_DISPLACEMENT_M: f64 = 2.0;
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 5_000;

/// Monitor configuration; missing JSON fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Alert radius; a marker at exactly this distance counts as inside.
    pub radius_m: f64,
    pub min_interval_ms: u64,
    pub min_displacement_m: f64,
    pub accuracy: LocationAccuracy,
    /// Re-alert while still inside after this long. `None` means only a
    /// fresh entry alerts again.
    pub cooldown_ms: Option<u64>,
    pub dispatch_timeout_ms: u64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_RADIUS_M,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            min_displacement_m: DEFAULT_MIN_DISPLACEMENT_M,
            accuracy: LocationAccuracy::Balanced,
            cooldown_ms: None,
            dispatch_timeout_ms: DEFAULT_DISPATCH_TIMEOUT_MS,
        }
    }
}

impl ProximityConfig {
    pub fn validate(&self) -> Result<(), ProximityConfigError> {
        if !self.radius_m.is_finite() || self.radius_m <= 0.0 {
            return Err(ProximityConfigError::InvalidRadius(self.radius_m));
        }
        if !self.min_displacement_m.is_finite() || self.min_displacement_m < 0.0 {
            return Err(ProximityConfigError::InvalidDisplacement(
                self.min_displacement_m,
            ));
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(ProximityConfigError::ZeroDispatchTimeout);
        }
        Ok(())
    }

    pub fn location_request(&self) -> LocationRequest {
        LocationRequest {
            min_interval: Duration::from_millis(self.min_interval_ms),
            min_displacement_m: self.min_displacement_m,
            accuracy: self.accuracy,
        }
    }

    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown_ms.map(Duration::from_millis)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProximityConfigError {
    InvalidRadius(f64),
    InvalidDisplacement(f64),
    ZeroDispatchTimeout,
}

impl Display for ProximityConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRadius(value) => {
                write!(f, "radius_m must be a positive finite number, got {value}")
            }
            Self::InvalidDisplacement(value) => write!(
                f,
                "min_displacement_m must be a non-negative finite number, got {value}"
            ),
            Self::ZeroDispatchTimeout => write!(f, "dispatch_timeout_ms must be greater than 0"),
        }
    }
}

impl Error for ProximityConfigError {}
