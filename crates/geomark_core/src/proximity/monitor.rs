//! Proximity monitor: tick function and the async tracking task.
//!
//! # Responsibility
//! - Compare each position sample against the latest marker snapshot.
//! - Route in-radius markers through the notification gate.
//! - Own the location subscription for the lifetime of a `TrackingHandle`.
//!
//! # Invariants
//! - Ticks are processed one at a time from a single channel; they never
//!   overlap.
//! - `Tracking` is entered only after location permission is granted and a
//!   marker snapshot has been published.
//! - Stream failures end tracking and are recorded, never panicked on.

use crate::error::{CoreError, CoreResult, ErrorSlot};
use crate::geo::Coordinate;
use crate::model::marker::{Marker, MarkerId};
use crate::permission::PlatformPermission;
use crate::ports::{
    LocationEvent, LocationProvider, LocationRequest, Notifier, ProximityNotification,
};
use crate::proximity::config::ProximityConfig;
use crate::proximity::gate::{GateDecision, NotificationGate};
use crate::service::marker_service::SnapshotReceiver;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const LOCATION_CHANNEL_CAPACITY: usize = 16;

/// Raw in-radius observation for one marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityEvent {
    pub marker_id: MarkerId,
    pub distance_m: f64,
}

/// Gate-approved alert, ready to become a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityAlert {
    pub marker_id: MarkerId,
    pub marker_label: String,
    pub distance_m: f64,
}

impl ProximityAlert {
    pub fn to_notification(&self) -> ProximityNotification {
        ProximityNotification {
            title: "Marker nearby".to_string(),
            body: format!(
                "You are {:.0} m from {}.",
                self.distance_m, self.marker_label
            ),
            play_sound: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Tracking,
}

/// Why a tracking task returned to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    PermissionRevoked,
    StreamFailed(String),
    SnapshotClosed,
}

/// Stateful tick evaluator.
#[derive(Debug, Clone)]
pub struct ProximityMonitor {
    gate: NotificationGate,
}

impl ProximityMonitor {
    pub fn new(config: &ProximityConfig) -> Self {
        Self {
            gate: NotificationGate::new(config.radius_m, config.cooldown()),
        }
    }

    pub fn radius_m(&self) -> f64 {
        self.gate.radius_m()
    }

    /// All markers within the radius of `position`, without gating.
    pub fn evaluate(&self, position: Coordinate, markers: &[Marker]) -> Vec<ProximityEvent> {
        markers
            .iter()
            .filter_map(|marker| {
                let distance_m = position.distance_to(&marker.coordinate());
                (distance_m <= self.radius_m()).then_some(ProximityEvent {
                    marker_id: marker.id,
                    distance_m,
                })
            })
            .collect()
    }

    /// Processes one location tick and returns the alerts to dispatch.
    pub fn step(
        &mut self,
        position: Coordinate,
        markers: &[Marker],
        now: Instant,
    ) -> Vec<ProximityAlert> {
        let live = markers.iter().map(|marker| marker.id).collect::<HashSet<_>>();
        self.gate.retain_markers(&live);

        let mut alerts = Vec::new();
        for marker in markers {
            let distance_m = position.distance_to(&marker.coordinate());
            match self.gate.observe(marker.id, distance_m, now) {
                GateDecision::Notify => alerts.push(ProximityAlert {
                    marker_id: marker.id,
                    marker_label: marker.display_name(),
                    distance_m,
                }),
                GateDecision::Suppressed => {
                    debug!(
                        "event=proximity_gate module=proximity status=skip marker_id={} distance_m={:.1}",
                        marker.id, distance_m
                    );
                }
                GateDecision::Outside => {}
            }
        }
        alerts
    }

    pub fn reset(&mut self) {
        self.gate.reset();
    }
}

/// Collaborators needed by a tracking task.
pub struct TrackingDeps {
    pub location: Arc<dyn LocationProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub markers: SnapshotReceiver,
    pub errors: ErrorSlot,
}

/// Owned handle to a running tracking task.
///
/// Dropping the handle aborts the task, which in turn aborts the location
/// feed; `stop` shuts down cooperatively and waits for the task to finish.
pub struct TrackingHandle {
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<MonitorState>,
    task: Option<JoinHandle<StopReason>>,
}

impl TrackingHandle {
    pub fn state(&self) -> MonitorState {
        *self.state_rx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<MonitorState> {
        self.state_rx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Requests shutdown and waits for the task to release the stream.
    pub async fn stop(mut self) -> StopReason {
        let _ = self.shutdown_tx.send(true);
        match self.task.take() {
            Some(task) => task.await.unwrap_or(StopReason::Cancelled),
            None => StopReason::Cancelled,
        }
    }

    /// Waits until the task ends on its own (revocation or stream failure).
    pub async fn join(mut self) -> StopReason {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(StopReason::Cancelled),
            None => StopReason::Cancelled,
        }
    }
}

impl Drop for TrackingHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Checks permissions and spawns the tracking task.
///
/// # Errors
/// - `CoreError::InvalidConfig` when `config` fails validation.
/// - `CoreError::PermissionDenied(Location)` when location access is refused;
///   no task is spawned.
pub async fn start_tracking(
    config: &ProximityConfig,
    deps: TrackingDeps,
) -> CoreResult<TrackingHandle> {
    if let Err(err) = config.validate() {
        warn!(
            "event=tracking_start module=proximity status=error error_code=invalid_config error={}",
            err
        );
        return Err(CoreError::InvalidConfig(err));
    }

    if !deps.location.request_permission().await.is_granted() {
        warn!("event=tracking_start module=proximity status=error error_code=location_permission_denied");
        return Err(CoreError::PermissionDenied(PlatformPermission::Location));
    }

    let notifications_allowed = deps.notifier.request_permission().await.is_granted();
    if !notifications_allowed {
        warn!("event=tracking_start module=proximity status=ok notifications=denied");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(MonitorState::Idle);
    let task = TrackingTask {
        monitor: ProximityMonitor::new(config),
        request: config.location_request(),
        dispatch_timeout: config.dispatch_timeout(),
        notifications_allowed,
        deps,
        state_tx,
        shutdown_rx,
    };

    Ok(TrackingHandle {
        shutdown_tx,
        state_rx,
        task: Some(tokio::spawn(task.run())),
    })
}

/// Aborts the location feed task when dropped, including when the tracking
/// task itself is aborted mid-await.
struct FeedGuard(JoinHandle<()>);

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct TrackingTask {
    monitor: ProximityMonitor,
    request: LocationRequest,
    dispatch_timeout: Duration,
    notifications_allowed: bool,
    deps: TrackingDeps,
    state_tx: watch::Sender<MonitorState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TrackingTask {
    async fn run(mut self) -> StopReason {
        let loaded = tokio::select! {
            _ = self.shutdown_rx.changed() => return StopReason::Cancelled,
            loaded = self.deps.markers.wait_for(Option::is_some) => loaded.is_ok(),
        };
        if !loaded {
            info!("event=tracking_stop module=proximity status=ok reason=snapshot_closed");
            return StopReason::SnapshotClosed;
        }

        let (tx, mut rx) = mpsc::channel(LOCATION_CHANNEL_CAPACITY);
        let location = Arc::clone(&self.deps.location);
        let request = self.request;
        let feed = FeedGuard(tokio::spawn(async move {
            let failure_tx = tx.clone();
            if let Err(err) = location.watch_position(request, tx).await {
                let _ = failure_tx.send(LocationEvent::Failed(err.to_string())).await;
            }
        }));

        let _ = self.state_tx.send(MonitorState::Tracking);
        info!("event=tracking_start module=proximity status=ok");

        let reason = loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => break StopReason::Cancelled,
                event = rx.recv() => match event {
                    Some(LocationEvent::Position(position)) => self.tick(position).await,
                    Some(LocationEvent::PermissionRevoked) => break StopReason::PermissionRevoked,
                    Some(LocationEvent::Failed(message)) => break StopReason::StreamFailed(message),
                    None => break StopReason::StreamFailed("location stream closed".to_string()),
                },
            }
        };

        drop(rx);
        drop(feed);
        self.monitor.reset();
        let _ = self.state_tx.send(MonitorState::Idle);

        match &reason {
            StopReason::StreamFailed(message) => {
                error!(
                    "event=tracking_stop module=proximity status=error error_code=location_unavailable error={}",
                    message
                );
                self.deps
                    .errors
                    .record(&CoreError::LocationUnavailable(message.clone()));
            }
            StopReason::PermissionRevoked => {
                warn!("event=tracking_stop module=proximity status=ok reason=permission_revoked");
            }
            _ => info!("event=tracking_stop module=proximity status=ok reason=cancelled"),
        }
        reason
    }

    async fn tick(&mut self, position: Coordinate) {
        let snapshot = self.deps.markers.borrow().clone().unwrap_or_default();
        let alerts = self.monitor.step(position, &snapshot, Instant::now());
        for alert in alerts {
            self.dispatch(&alert).await;
        }
    }

    async fn dispatch(&self, alert: &ProximityAlert) {
        if !self.notifications_allowed {
            info!(
                "event=proximity_notify module=proximity status=skip reason=permission_denied marker_id={}",
                alert.marker_id
            );
            return;
        }

        let notification = alert.to_notification();
        let outcome =
            tokio::time::timeout(self.dispatch_timeout, self.deps.notifier.notify(&notification))
                .await;
        let err = match outcome {
            Ok(Ok(())) => {
                info!(
                    "event=proximity_notify module=proximity status=ok marker_id={} distance_m={:.1}",
                    alert.marker_id, alert.distance_m
                );
                return;
            }
            Ok(Err(err)) => err,
            Err(_) => CoreError::NotificationFailed(format!(
                "dispatch timed out after {} ms",
                self.dispatch_timeout.as_millis()
            )),
        };
        warn!(
            "event=proximity_notify module=proximity status=error marker_id={} error={}",
            alert.marker_id, err
        );
        self.deps.errors.record(&err);
    }
}
