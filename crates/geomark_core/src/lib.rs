//! Core domain logic for GeoMark.
//! This crate owns marker persistence, proximity detection and the rules
//! that keep them consistent.

pub mod db;
pub mod error;
pub mod geo;
pub mod logging;
pub mod model;
pub mod permission;
pub mod ports;
pub mod proximity;
pub mod repo;
pub mod screen;
pub mod service;

pub use error::{CoreError, CoreResult, ErrorKind, ErrorReport, ErrorSlot};
pub use geo::{haversine_distance_m, Coordinate, CoordinateError, EARTH_RADIUS_M};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::image::{ImageId, MarkerImage};
pub use model::marker::{DeleteOutcome, Marker, MarkerId, MarkerValidationError};
pub use permission::{PermissionStatus, PlatformPermission};
pub use ports::{
    LocationAccuracy, LocationEvent, LocationProvider, LocationRequest, MediaPicker, Notifier,
    PickOutcome, ProximityNotification,
};
pub use proximity::config::{ProximityConfig, ProximityConfigError};
pub use proximity::gate::{GateDecision, NotificationGate};
pub use proximity::monitor::{
    start_tracking, MonitorState, ProximityAlert, ProximityEvent, ProximityMonitor, StopReason,
    TrackingDeps, TrackingHandle,
};
pub use repo::marker_repo::{MarkerRepository, SqliteMarkerRepository};
pub use repo::{RepoError, RepoResult};
pub use screen::{initial_region, MapRegion, Route};
pub use service::marker_service::{MarkerService, MarkerSnapshot, SnapshotReceiver};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
