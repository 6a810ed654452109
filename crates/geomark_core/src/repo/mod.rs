//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the marker/image data access contract.
//! - Isolate SQLite query details from the façade and the monitor.
//!
//! # Invariants
//! - Write paths validate input before any SQL mutation.
//! - Operations that reference a missing parent marker return
//!   `RepoError::MarkerNotFound` and write nothing.
//! - Deleting a missing row reports `DeleteOutcome::NotFound`, never an error.

use crate::db::DbError;
use crate::geo::CoordinateError;
use crate::model::marker::{MarkerId, MarkerValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod marker_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for marker/image persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(MarkerValidationError),
    Db(DbError),
    MarkerNotFound(MarkerId),
    InvalidData(String),
}

impl RepoError {
    /// Whether this error refers to a missing parent marker.
    pub fn is_reference_error(&self) -> bool {
        matches!(self, Self::MarkerNotFound(_))
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::MarkerNotFound(id) => write!(f, "marker not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted marker data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::MarkerNotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<MarkerValidationError> for RepoError {
    fn from(value: MarkerValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<CoordinateError> for RepoError {
    fn from(value: CoordinateError) -> Self {
        Self::Validation(value.into())
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
