//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Own the single app `Session` between `app_start` and `app_stop`.
//! - Run proximity ticks for positions pushed from the Dart location stream.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every fallible call returns an envelope with `ok` and a UTF-8 `message`.
//! - Session access is serialized through one mutex.

use geomark_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    Coordinate, CoreError, DeleteOutcome, ErrorReport, ErrorSlot, Marker, MarkerImage,
    MarkerService, ProximityConfig, ProximityMonitor, SqliteMarkerRepository,
};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

const DB_FILE_NAME: &str = "geomark.sqlite3";
const DB_PATH_ENV: &str = "GEOMARK_DB_PATH";

static SESSION: Mutex<Option<Session>> = Mutex::new(None);

struct Session {
    db_path: PathBuf,
    service: MarkerService<SqliteMarkerRepository>,
    monitor: ProximityMonitor,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Marker projection for Dart.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerItem {
    pub id: i64,
    /// Optional user label.
    pub name: Option<String>,
    /// Label to render; falls back to `Marker #<id>`.
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
}

/// Image projection for Dart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageItem {
    pub id: i64,
    pub marker_id: i64,
    pub uri: String,
    pub created_at: i64,
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Stable error kind (`storage_error`, `reference_error`, ...) on failure.
    pub error_kind: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

/// Response for single-marker calls.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerResponse {
    pub ok: bool,
    pub marker: Option<MarkerItem>,
    pub error_kind: Option<String>,
    pub message: String,
}

/// Response for marker listing.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerListResponse {
    pub ok: bool,
    pub items: Vec<MarkerItem>,
    pub error_kind: Option<String>,
    pub message: String,
}

/// Response for single-image calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResponse {
    pub ok: bool,
    pub image: Option<ImageItem>,
    pub error_kind: Option<String>,
    pub message: String,
}

/// Response for image listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageListResponse {
    pub ok: bool,
    pub items: Vec<ImageItem>,
    pub error_kind: Option<String>,
    pub message: String,
}

/// Response for deletes; a missing row is `ok` with `deleted=false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResponse {
    pub ok: bool,
    pub deleted: bool,
    pub error_kind: Option<String>,
    pub message: String,
}

/// One notification the Dart side should show.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityAlertItem {
    pub marker_id: i64,
    pub distance_m: f64,
    pub title: String,
    pub body: String,
    pub play_sound: bool,
}

/// Result of one pushed position.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityResponse {
    pub ok: bool,
    pub alerts: Vec<ProximityAlertItem>,
    pub message: String,
}

/// Last recorded failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorItem {
    pub kind: String,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            error_kind: None,
            message: message.into(),
        }
    }

    fn failure(error_kind: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_kind: error_kind.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Opens the marker store and loads the marker cache.
///
/// Input semantics:
/// - `db_path`: database file; blank or `None` falls back to
///   `GEOMARK_DB_PATH`, then `<tmp>/geomark.sqlite3`.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Replaces any running session.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn app_start(db_path: Option<String>) -> ActionResponse {
    let path = resolve_db_path(db_path.as_deref());
    let repo = match SqliteMarkerRepository::open(&path) {
        Ok(repo) => repo,
        Err(err) => {
            warn!("event=app_start module=ffi status=error error={}", err);
            let err = CoreError::from(err);
            return ActionResponse::failure(
                Some(err.kind().as_str()),
                format!("app_start failed: {err}"),
            );
        }
    };

    let mut service = MarkerService::new(repo, ErrorSlot::new());
    let markers = match service.load() {
        Ok(markers) => markers,
        Err(err) => {
            return ActionResponse::failure(
                Some(err.kind().as_str()),
                format!("app_start failed: {err}"),
            )
        }
    };

    let mut session = lock_session();
    if session.is_some() {
        info!("event=app_start module=ffi status=ok replaced_session=true");
    }
    *session = Some(Session {
        db_path: path,
        service,
        monitor: ProximityMonitor::new(&ProximityConfig::default()),
    });
    info!(
        "event=app_start module=ffi status=ok marker_count={}",
        markers.len()
    );
    ActionResponse::success(format!("Session started with {} marker(s).", markers.len()))
}

/// Closes the session and its database connection.
///
/// # FFI contract
/// - Sync call; idempotent.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn app_stop() -> ActionResponse {
    match lock_session().take() {
        Some(session) => {
            info!("event=app_stop module=ffi status=ok");
            drop(session);
            ActionResponse::success("Session stopped.")
        }
        None => ActionResponse::success("No session running."),
    }
}

/// Database file used by the running session.
#[flutter_rust_bridge::frb(sync)]
pub fn session_db_path() -> Option<String> {
    lock_session()
        .as_ref()
        .map(|session| session.db_path.display().to_string())
}

/// Lists cached markers.
#[flutter_rust_bridge::frb(sync)]
pub fn marker_list() -> MarkerListResponse {
    match with_session(|session| session.service.current_markers()) {
        Ok(markers) => {
            let items = markers.iter().map(to_marker_item).collect::<Vec<_>>();
            MarkerListResponse {
                ok: true,
                error_kind: None,
                message: format!("{} marker(s).", items.len()),
                items,
            }
        }
        Err(message) => MarkerListResponse {
            ok: false,
            items: Vec::new(),
            error_kind: None,
            message,
        },
    }
}

/// Creates a marker at a long-pressed coordinate.
#[flutter_rust_bridge::frb(sync)]
pub fn marker_add(latitude: f64, longitude: f64) -> MarkerResponse {
    marker_response(
        "marker_add",
        with_session(|session| session.service.add_marker(latitude, longitude)),
    )
}

/// Sets or clears a marker label; blank clears it.
#[flutter_rust_bridge::frb(sync)]
pub fn marker_rename(marker_id: i64, name: Option<String>) -> MarkerResponse {
    marker_response(
        "marker_rename",
        with_session(|session| session.service.rename_marker(marker_id, name.as_deref())),
    )
}

/// Deletes a marker and its images.
#[flutter_rust_bridge::frb(sync)]
pub fn marker_remove(marker_id: i64) -> DeleteResponse {
    delete_response(
        "marker_remove",
        with_session(|session| session.service.remove_marker(marker_id)),
    )
}

/// Attaches an already-picked image URI to a marker.
#[flutter_rust_bridge::frb(sync)]
pub fn image_add(marker_id: i64, uri: String) -> ImageResponse {
    match with_session(|session| session.service.add_image(marker_id, &uri)) {
        Ok(Ok(image)) => ImageResponse {
            ok: true,
            image: Some(to_image_item(&image)),
            error_kind: None,
            message: "Image attached.".to_string(),
        },
        Ok(Err(err)) => ImageResponse {
            ok: false,
            image: None,
            error_kind: Some(err.kind().as_str().to_string()),
            message: format!("image_add failed: {err}"),
        },
        Err(message) => ImageResponse {
            ok: false,
            image: None,
            error_kind: None,
            message,
        },
    }
}

/// Removes one image of `marker_id`.
#[flutter_rust_bridge::frb(sync)]
pub fn image_remove(image_id: i64, marker_id: i64) -> DeleteResponse {
    delete_response(
        "image_remove",
        with_session(|session| session.service.remove_image(image_id, marker_id)),
    )
}

/// Images attached to one marker.
#[flutter_rust_bridge::frb(sync)]
pub fn images_for(marker_id: i64) -> ImageListResponse {
    match with_session(|session| session.service.images_for(marker_id)) {
        Ok(Ok(images)) => ImageListResponse {
            ok: true,
            error_kind: None,
            message: format!("{} image(s).", images.len()),
            items: images.iter().map(to_image_item).collect(),
        },
        Ok(Err(err)) => ImageListResponse {
            ok: false,
            items: Vec::new(),
            error_kind: Some(err.kind().as_str().to_string()),
            message: format!("images_for failed: {err}"),
        },
        Err(message) => ImageListResponse {
            ok: false,
            items: Vec::new(),
            error_kind: None,
            message,
        },
    }
}

/// Evaluates one position from the Dart location stream.
///
/// # FFI contract
/// - Sync call, in-memory only.
/// - Returned alerts are already gated; show each one exactly once.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn proximity_push_position(latitude: f64, longitude: f64) -> ProximityResponse {
    let position = Coordinate::new(latitude, longitude);
    if let Err(err) = position.validate() {
        return ProximityResponse {
            ok: false,
            alerts: Vec::new(),
            message: format!("proximity_push_position rejected: {err}"),
        };
    }

    let alerts = with_session(|session| {
        let markers = session.service.current_markers();
        session.monitor.step(position, &markers, Instant::now())
    });
    match alerts {
        Ok(alerts) => {
            let items = alerts
                .iter()
                .map(|alert| {
                    let notification = alert.to_notification();
                    ProximityAlertItem {
                        marker_id: alert.marker_id,
                        distance_m: alert.distance_m,
                        title: notification.title,
                        body: notification.body,
                        play_sound: notification.play_sound,
                    }
                })
                .collect::<Vec<_>>();
            ProximityResponse {
                ok: true,
                message: format!("{} alert(s).", items.len()),
                alerts: items,
            }
        }
        Err(message) => ProximityResponse {
            ok: false,
            alerts: Vec::new(),
            message,
        },
    }
}

/// Forgets inside/outside state, e.g. after the Dart stream restarts.
#[flutter_rust_bridge::frb(sync)]
pub fn proximity_reset() -> ActionResponse {
    match with_session(|session| session.monitor.reset()) {
        Ok(()) => ActionResponse::success("Proximity state reset."),
        Err(message) => ActionResponse::failure(None, message),
    }
}

/// Most recent recorded failure, if any.
#[flutter_rust_bridge::frb(sync)]
pub fn last_error() -> Option<ErrorItem> {
    with_session(|session| session.service.last_error())
        .ok()
        .flatten()
        .map(to_error_item)
}

/// Clears and returns the most recent recorded failure.
#[flutter_rust_bridge::frb(sync)]
pub fn clear_error() -> Option<ErrorItem> {
    with_session(|session| session.service.clear_error())
        .ok()
        .flatten()
        .map(to_error_item)
}

fn resolve_db_path(explicit: Option<&str>) -> PathBuf {
    if let Some(raw) = explicit {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    if let Ok(raw) = std::env::var(DB_PATH_ENV) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::temp_dir().join(DB_FILE_NAME)
}

fn lock_session() -> MutexGuard<'static, Option<Session>> {
    SESSION
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn with_session<T>(f: impl FnOnce(&mut Session) -> T) -> Result<T, String> {
    let mut guard = lock_session();
    match guard.as_mut() {
        Some(session) => Ok(f(session)),
        None => Err("session not started; call app_start first".to_string()),
    }
}

fn marker_response(
    operation: &str,
    result: Result<Result<Marker, CoreError>, String>,
) -> MarkerResponse {
    match result {
        Ok(Ok(marker)) => MarkerResponse {
            ok: true,
            marker: Some(to_marker_item(&marker)),
            error_kind: None,
            message: format!("Marker {} saved.", marker.id),
        },
        Ok(Err(err)) => MarkerResponse {
            ok: false,
            marker: None,
            error_kind: Some(err.kind().as_str().to_string()),
            message: format!("{operation} failed: {err}"),
        },
        Err(message) => MarkerResponse {
            ok: false,
            marker: None,
            error_kind: None,
            message,
        },
    }
}

fn delete_response(
    operation: &str,
    result: Result<Result<DeleteOutcome, CoreError>, String>,
) -> DeleteResponse {
    match result {
        Ok(Ok(outcome)) => DeleteResponse {
            ok: true,
            deleted: outcome == DeleteOutcome::Deleted,
            error_kind: None,
            message: format!("{operation}: {}", outcome.as_str()),
        },
        Ok(Err(err)) => DeleteResponse {
            ok: false,
            deleted: false,
            error_kind: Some(err.kind().as_str().to_string()),
            message: format!("{operation} failed: {err}"),
        },
        Err(message) => DeleteResponse {
            ok: false,
            deleted: false,
            error_kind: None,
            message,
        },
    }
}

fn to_marker_item(marker: &Marker) -> MarkerItem {
    MarkerItem {
        id: marker.id,
        name: marker.name.clone(),
        display_name: marker.display_name(),
        latitude: marker.latitude,
        longitude: marker.longitude,
        created_at: marker.created_at,
    }
}

fn to_image_item(image: &MarkerImage) -> ImageItem {
    ImageItem {
        id: image.id,
        marker_id: image.marker_id,
        uri: image.uri.clone(),
        created_at: image.created_at,
    }
}

fn to_error_item(report: ErrorReport) -> ErrorItem {
    ErrorItem {
        kind: report.kind.as_str().to_string(),
        message: report.message,
    }
}
