//! Core error taxonomy and the UI-visible last-error slot.
//!
//! # Invariants
//! - Every `CoreError` maps to exactly one `ErrorKind`.
//! - The slot only ever holds the most recent report; nothing is retried.

use crate::db::DbError;
use crate::model::marker::MarkerId;
use crate::permission::PlatformPermission;
use crate::proximity::config::ProximityConfigError;
use crate::repo::RepoError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

pub type CoreResult<T> = Result<T, CoreError>;

/// Stable error category surfaced to the mobile shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Storage,
    Reference,
    PermissionDenied,
    LocationUnavailable,
    NotificationFailed,
    InvalidConfig,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage_error",
            Self::Reference => "reference_error",
            Self::PermissionDenied => "permission_denied",
            Self::LocationUnavailable => "location_unavailable",
            Self::NotificationFailed => "notification_failed",
            Self::InvalidConfig => "invalid_config",
        }
    }
}

/// Error returned by the façade, the monitor and collaborator adapters.
#[derive(Debug)]
pub enum CoreError {
    /// Store unavailable, write failed, or input rejected before writing.
    Storage(RepoError),
    /// Operation referenced a marker that does not exist.
    Reference(MarkerId),
    PermissionDenied(PlatformPermission),
    LocationUnavailable(String),
    NotificationFailed(String),
    /// Proximity settings rejected before tracking starts.
    InvalidConfig(ProximityConfigError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) => ErrorKind::Storage,
            Self::Reference(_) => ErrorKind::Reference,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::LocationUnavailable(_) => ErrorKind::LocationUnavailable,
            Self::NotificationFailed(_) => ErrorKind::NotificationFailed,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Reference(id) => write!(f, "marker {id} does not exist"),
            Self::PermissionDenied(permission) => {
                write!(f, "{permission} permission denied")
            }
            Self::LocationUnavailable(message) => write!(f, "location unavailable: {message}"),
            Self::NotificationFailed(message) => write!(f, "notification failed: {message}"),
            Self::InvalidConfig(err) => write!(f, "invalid proximity config: {err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::InvalidConfig(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::MarkerNotFound(id) => Self::Reference(id),
            other => Self::Storage(other),
        }
    }
}

impl From<ProximityConfigError> for CoreError {
    fn from(value: ProximityConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

impl From<DbError> for CoreError {
    fn from(value: DbError) -> Self {
        Self::Storage(RepoError::Db(value))
    }
}

/// Snapshot of the last recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

/// Shared last-error cell read by the UI layer.
///
/// Cloning shares the same cell, so the façade and the monitor can both
/// record into one slot owned by the application session.
#[derive(Debug, Clone, Default)]
pub struct ErrorSlot {
    inner: Arc<Mutex<Option<ErrorReport>>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, err: &CoreError) {
        *self.lock() = Some(ErrorReport {
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    pub fn last(&self) -> Option<ErrorReport> {
        self.lock().clone()
    }

    pub fn take(&self) -> Option<ErrorReport> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ErrorReport>> {
        // A panic while holding the lock cannot leave a partial report behind.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::{CoreError, ErrorKind, ErrorSlot};
    use crate::permission::PlatformPermission;
    use crate::repo::RepoError;

    #[test]
    fn missing_marker_maps_to_reference_kind() {
        let err = CoreError::from(RepoError::MarkerNotFound(7));
        assert_eq!(err.kind(), ErrorKind::Reference);
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn slot_keeps_only_latest_report_and_is_shared_across_clones() {
        let slot = ErrorSlot::new();
        let shared = slot.clone();

        slot.record(&CoreError::Reference(1));
        shared.record(&CoreError::PermissionDenied(PlatformPermission::Location));

        let report = slot.last().expect("report recorded");
        assert_eq!(report.kind, ErrorKind::PermissionDenied);
        assert_eq!(report.message, "location permission denied");

        assert!(shared.take().is_some());
        assert!(slot.last().is_none());
    }
}
