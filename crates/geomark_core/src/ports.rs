//! Platform collaborator ports.
//!
//! The mobile shell implements these traits over its location, notification
//! and media-picker services. Core code only depends on the traits.

use crate::error::CoreResult;
use crate::geo::Coordinate;
use crate::permission::PermissionStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Accuracy hint forwarded to the platform location service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationAccuracy {
    Low,
    #[default]
    Balanced,
    High,
}

/// Subscription parameters for a position stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationRequest {
    pub min_interval: Duration,
    pub min_displacement_m: f64,
    pub accuracy: LocationAccuracy,
}

/// One item delivered by a position stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Position(Coordinate),
    /// The user revoked location access while the stream was live.
    PermissionRevoked,
    /// The platform stream failed; no further positions follow.
    Failed(String),
}

/// Location service port.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Checks or requests foreground location permission.
    async fn request_permission(&self) -> PermissionStatus;

    /// One-shot current position.
    async fn current_position(&self) -> CoreResult<Coordinate>;

    /// Streams positions into `tx` until the receiver is dropped or the
    /// platform stream ends.
    ///
    /// Implementations must stop the platform subscription once `tx.send`
    /// fails; that is how the monitor releases it.
    async fn watch_position(
        &self,
        request: LocationRequest,
        tx: mpsc::Sender<LocationEvent>,
    ) -> CoreResult<()>;
}

/// Immediate local alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximityNotification {
    pub title: String,
    pub body: String,
    pub play_sound: bool,
}

/// Local notification port.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;

    async fn notify(&self, notification: &ProximityNotification) -> CoreResult<()>;
}

/// Result of one media-library pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    Selected(String),
    Cancelled,
}

/// Media-library picker port.
#[async_trait]
pub trait MediaPicker: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;

    async fn pick_image(&self) -> CoreResult<PickOutcome>;
}
