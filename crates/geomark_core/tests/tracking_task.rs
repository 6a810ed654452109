use async_trait::async_trait;
use geomark_core::{
    start_tracking, Coordinate, CoreError, CoreResult, ErrorKind, ErrorSlot, LocationEvent,
    LocationProvider, LocationRequest, MarkerService, MonitorState, Notifier, PermissionStatus,
    PlatformPermission, ProximityConfig, ProximityNotification, SqliteMarkerRepository,
    StopReason, TrackingDeps, TrackingHandle,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

const BASE_LAT: f64 = 37.78825;
const BASE_LON: f64 = -122.4324;
const WAIT: Duration = Duration::from_secs(2);

fn far() -> LocationEvent {
    LocationEvent::Position(Coordinate::new(BASE_LAT + 0.01, BASE_LON))
}

fn near() -> LocationEvent {
    LocationEvent::Position(Coordinate::new(BASE_LAT + 0.0003, BASE_LON))
}

/// Location fake fed by the test through an mpsc channel.
struct ScriptedLocation {
    permission: PermissionStatus,
    script: tokio::sync::Mutex<Option<mpsc::Receiver<LocationEvent>>>,
    requests: Mutex<Vec<LocationRequest>>,
    released_tx: watch::Sender<bool>,
}

struct ReleaseGuard(watch::Sender<bool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

impl ScriptedLocation {
    fn new(
        permission: PermissionStatus,
    ) -> (Arc<Self>, mpsc::Sender<LocationEvent>, watch::Receiver<bool>) {
        let (script_tx, script_rx) = mpsc::channel(32);
        let (released_tx, released_rx) = watch::channel(false);
        let location = Arc::new(Self {
            permission,
            script: tokio::sync::Mutex::new(Some(script_rx)),
            requests: Mutex::new(Vec::new()),
            released_tx,
        });
        (location, script_tx, released_rx)
    }
}

#[async_trait]
impl LocationProvider for ScriptedLocation {
    async fn request_permission(&self) -> PermissionStatus {
        self.permission
    }

    async fn current_position(&self) -> CoreResult<Coordinate> {
        Ok(Coordinate::new(BASE_LAT, BASE_LON))
    }

    async fn watch_position(
        &self,
        request: LocationRequest,
        tx: mpsc::Sender<LocationEvent>,
    ) -> CoreResult<()> {
        self.requests.lock().unwrap().push(request);
        let _guard = ReleaseGuard(self.released_tx.clone());
        let mut script = self
            .script
            .lock()
            .await
            .take()
            .ok_or_else(|| CoreError::LocationUnavailable("already subscribed".to_string()))?;

        loop {
            tokio::select! {
                _ = tx.closed() => return Ok(()),
                event = script.recv() => match event {
                    Some(event) => {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

struct RecordingNotifier {
    permission: PermissionStatus,
    delay: Option<Duration>,
    sent: Mutex<Vec<ProximityNotification>>,
    sent_tx: mpsc::UnboundedSender<ProximityNotification>,
}

impl RecordingNotifier {
    fn new(
        permission: PermissionStatus,
        delay: Option<Duration>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ProximityNotification>) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let notifier = Arc::new(Self {
            permission,
            delay,
            sent: Mutex::new(Vec::new()),
            sent_tx,
        });
        (notifier, sent_rx)
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn request_permission(&self) -> PermissionStatus {
        self.permission
    }

    async fn notify(&self, notification: &ProximityNotification) -> CoreResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(notification.clone());
        let _ = self.sent_tx.send(notification.clone());
        Ok(())
    }
}

fn loaded_service(errors: &ErrorSlot) -> MarkerService<SqliteMarkerRepository> {
    let repo = SqliteMarkerRepository::open_in_memory().unwrap();
    let mut service = MarkerService::new(repo, errors.clone());
    service.load().unwrap();
    service
}

async fn wait_for_state(handle: &TrackingHandle, state: MonitorState) {
    let mut changes = handle.state_changes();
    timeout(WAIT, changes.wait_for(|current| *current == state))
        .await
        .expect("state change timed out")
        .expect("state channel open");
}

#[tokio::test]
async fn denied_location_permission_prevents_tracking() {
    let errors = ErrorSlot::new();
    let service = loaded_service(&errors);
    let (location, _script, _released) = ScriptedLocation::new(PermissionStatus::Denied);
    let (notifier, _sent) = RecordingNotifier::new(PermissionStatus::Granted, None);

    let result = start_tracking(
        &ProximityConfig::default(),
        TrackingDeps {
            location: location.clone(),
            notifier,
            markers: service.subscribe(),
            errors,
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(CoreError::PermissionDenied(PlatformPermission::Location))
    ));
    assert!(location.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tracking_alerts_once_per_entry_and_follows_marker_deletions() {
    let errors = ErrorSlot::new();
    let mut service = loaded_service(&errors);
    let home = service.add_marker(BASE_LAT, BASE_LON).unwrap();
    service.rename_marker(home.id, Some("Home")).unwrap();

    let (location, script, released) = ScriptedLocation::new(PermissionStatus::Granted);
    let (notifier, mut sent) = RecordingNotifier::new(PermissionStatus::Granted, None);
    let handle = start_tracking(
        &ProximityConfig::default(),
        TrackingDeps {
            location: location.clone(),
            notifier: notifier.clone(),
            markers: service.subscribe(),
            errors: errors.clone(),
        },
    )
    .await
    .unwrap();
    wait_for_state(&handle, MonitorState::Tracking).await;

    for event in [far(), near(), near(), near()] {
        script.send(event).await.unwrap();
    }
    let first = timeout(WAIT, sent.recv()).await.unwrap().unwrap();
    assert_eq!(first.title, "Marker nearby");
    assert!(first.body.contains("Home"));

    for event in [near(), far(), near()] {
        script.send(event).await.unwrap();
    }
    timeout(WAIT, sent.recv()).await.unwrap().unwrap();
    assert_eq!(notifier.sent_count(), 2);

    // Once the marker is gone, re-entering its old spot is silent.
    service.remove_marker(home.id).unwrap();
    let other = service.add_marker(BASE_LAT + 0.02, BASE_LON).unwrap();
    for event in [far(), near()] {
        script.send(event).await.unwrap();
    }
    script
        .send(LocationEvent::Position(Coordinate::new(
            other.latitude,
            other.longitude,
        )))
        .await
        .unwrap();
    let third = timeout(WAIT, sent.recv()).await.unwrap().unwrap();
    assert!(third.body.contains(&format!("Marker #{}", other.id)));
    assert_eq!(notifier.sent_count(), 3);

    assert_eq!(handle.stop().await, StopReason::Cancelled);
    let mut released = released;
    timeout(WAIT, released.wait_for(|done| *done))
        .await
        .expect("subscription should be released")
        .unwrap();

    let requests = location.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].min_interval, Duration::from_secs(5));
    assert_eq!(requests[0].min_displacement_m, 2.0);
    assert!(errors.last().is_none());
}

#[tokio::test]
async fn tracking_waits_for_first_marker_snapshot() {
    let errors = ErrorSlot::new();
    let repo = SqliteMarkerRepository::open_in_memory().unwrap();
    let mut service = MarkerService::new(repo, errors.clone());

    let (location, _script, _released) = ScriptedLocation::new(PermissionStatus::Granted);
    let (notifier, _sent) = RecordingNotifier::new(PermissionStatus::Granted, None);
    let handle = start_tracking(
        &ProximityConfig::default(),
        TrackingDeps {
            location: location.clone(),
            notifier,
            markers: service.subscribe(),
            errors,
        },
    )
    .await
    .unwrap();

    tokio::task::yield_now().await;
    assert_eq!(handle.state(), MonitorState::Idle);
    assert!(location.requests.lock().unwrap().is_empty());

    service.load().unwrap();
    wait_for_state(&handle, MonitorState::Tracking).await;
    assert_eq!(handle.stop().await, StopReason::Cancelled);
}

#[tokio::test]
async fn stream_failure_stops_tracking_and_records_location_unavailable() {
    let errors = ErrorSlot::new();
    let service = loaded_service(&errors);
    let (location, script, _released) = ScriptedLocation::new(PermissionStatus::Granted);
    let (notifier, _sent) = RecordingNotifier::new(PermissionStatus::Granted, None);
    let handle = start_tracking(
        &ProximityConfig::default(),
        TrackingDeps {
            location,
            notifier,
            markers: service.subscribe(),
            errors: errors.clone(),
        },
    )
    .await
    .unwrap();
    wait_for_state(&handle, MonitorState::Tracking).await;
    let mut state = handle.state_changes();

    script
        .send(LocationEvent::Failed("gps disabled".to_string()))
        .await
        .unwrap();
    let reason = timeout(WAIT, handle.join()).await.unwrap();

    assert_eq!(reason, StopReason::StreamFailed("gps disabled".to_string()));
    assert_eq!(*state.borrow_and_update(), MonitorState::Idle);
    let report = errors.last().expect("failure recorded");
    assert_eq!(report.kind, ErrorKind::LocationUnavailable);
    assert!(report.message.contains("gps disabled"));
}

#[tokio::test]
async fn permission_revocation_returns_to_idle_without_error() {
    let errors = ErrorSlot::new();
    let service = loaded_service(&errors);
    let (location, script, _released) = ScriptedLocation::new(PermissionStatus::Granted);
    let (notifier, _sent) = RecordingNotifier::new(PermissionStatus::Granted, None);
    let handle = start_tracking(
        &ProximityConfig::default(),
        TrackingDeps {
            location,
            notifier,
            markers: service.subscribe(),
            errors: errors.clone(),
        },
    )
    .await
    .unwrap();
    wait_for_state(&handle, MonitorState::Tracking).await;
    assert!(!handle.is_finished());

    script.send(LocationEvent::PermissionRevoked).await.unwrap();
    wait_for_state(&handle, MonitorState::Idle).await;
    timeout(WAIT, async {
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("task should finish after revocation");
    let reason = timeout(WAIT, handle.join()).await.unwrap();

    assert_eq!(reason, StopReason::PermissionRevoked);
    assert!(errors.last().is_none());
}

/// Location fake whose stream never ends on its own and ignores the
/// receiver; only cancellation of the feed task releases it.
struct StubbornLocation {
    subscribed_tx: watch::Sender<bool>,
    released_tx: watch::Sender<bool>,
}

#[async_trait]
impl LocationProvider for StubbornLocation {
    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn current_position(&self) -> CoreResult<Coordinate> {
        Ok(Coordinate::new(BASE_LAT, BASE_LON))
    }

    async fn watch_position(
        &self,
        _request: LocationRequest,
        _tx: mpsc::Sender<LocationEvent>,
    ) -> CoreResult<()> {
        let _guard = ReleaseGuard(self.released_tx.clone());
        self.subscribed_tx.send_replace(true);
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn dropping_handle_releases_location_subscription() {
    let errors = ErrorSlot::new();
    let service = loaded_service(&errors);
    let (subscribed_tx, mut subscribed) = watch::channel(false);
    let (released_tx, mut released) = watch::channel(false);
    let location = Arc::new(StubbornLocation {
        subscribed_tx,
        released_tx,
    });
    let (notifier, _sent) = RecordingNotifier::new(PermissionStatus::Granted, None);
    let handle = start_tracking(
        &ProximityConfig::default(),
        TrackingDeps {
            location,
            notifier,
            markers: service.subscribe(),
            errors,
        },
    )
    .await
    .unwrap();
    wait_for_state(&handle, MonitorState::Tracking).await;
    timeout(WAIT, subscribed.wait_for(|live| *live))
        .await
        .expect("subscription should start")
        .unwrap();
    assert!(!*released.borrow());

    drop(handle);

    timeout(WAIT, released.wait_for(|done| *done))
        .await
        .expect("dropping the handle should release the subscription")
        .unwrap();
}

#[tokio::test]
async fn invalid_config_is_rejected_before_permission_prompt() {
    let errors = ErrorSlot::new();
    let service = loaded_service(&errors);
    let (location, _script, _released) = ScriptedLocation::new(PermissionStatus::Granted);
    let (notifier, _sent) = RecordingNotifier::new(PermissionStatus::Granted, None);
    let config = ProximityConfig {
        radius_m: -5.0,
        dispatch_timeout_ms: 0,
        ..ProximityConfig::default()
    };

    let result = start_tracking(
        &config,
        TrackingDeps {
            location: location.clone(),
            notifier,
            markers: service.subscribe(),
            errors,
        },
    )
    .await;

    let err = match result {
        Err(err) => err,
        Ok(_) => panic!("negative radius must be rejected"),
    };
    assert!(matches!(err, CoreError::InvalidConfig(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    assert!(location.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn denied_notification_permission_skips_dispatch() {
    let errors = ErrorSlot::new();
    let mut service = loaded_service(&errors);
    service.add_marker(BASE_LAT, BASE_LON).unwrap();
    let (location, script, _released) = ScriptedLocation::new(PermissionStatus::Granted);
    let (notifier, _sent) = RecordingNotifier::new(PermissionStatus::Denied, None);
    let handle = start_tracking(
        &ProximityConfig::default(),
        TrackingDeps {
            location,
            notifier: notifier.clone(),
            markers: service.subscribe(),
            errors,
        },
    )
    .await
    .unwrap();
    wait_for_state(&handle, MonitorState::Tracking).await;

    script.send(near()).await.unwrap();
    script.send(LocationEvent::PermissionRevoked).await.unwrap();
    timeout(WAIT, handle.join()).await.unwrap();

    assert_eq!(notifier.sent_count(), 0);
}

#[tokio::test]
async fn slow_notifier_is_bounded_by_dispatch_timeout() {
    let errors = ErrorSlot::new();
    let mut service = loaded_service(&errors);
    service.add_marker(BASE_LAT, BASE_LON).unwrap();
    let (location, script, _released) = ScriptedLocation::new(PermissionStatus::Granted);
    let (notifier, _sent) =
        RecordingNotifier::new(PermissionStatus::Granted, Some(Duration::from_secs(30)));
    let config = ProximityConfig {
        dispatch_timeout_ms: 50,
        ..ProximityConfig::default()
    };
    let handle = start_tracking(
        &config,
        TrackingDeps {
            location,
            notifier: notifier.clone(),
            markers: service.subscribe(),
            errors: errors.clone(),
        },
    )
    .await
    .unwrap();
    wait_for_state(&handle, MonitorState::Tracking).await;

    script.send(near()).await.unwrap();
    script.send(LocationEvent::PermissionRevoked).await.unwrap();
    timeout(WAIT, handle.join()).await.unwrap();

    let report = errors.last().expect("timeout recorded");
    assert_eq!(report.kind, ErrorKind::NotificationFailed);
    assert!(report.message.contains("timed out"));
    assert_eq!(notifier.sent_count(), 0);
}
