//! Marker domain model.
//!
//! # Responsibility
//! - Define the persisted marker record and its identifier type.
//! - Validate coordinates and labels before they reach SQL.
//!
//! # Invariants
//! - `id` is assigned by the store (`AUTOINCREMENT`) and never reused.
//! - `latitude`/`longitude` are immutable after creation.
//! - `name`, when present, is trimmed and non-empty.

use crate::geo::{Coordinate, CoordinateError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned marker identifier.
pub type MarkerId = i64;

/// Maximum marker label length, in characters.
pub const MARKER_NAME_MAX_CHARS: usize = 120;

/// Persisted geo-located point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    /// Serialized as `marker_name` to match the storage column.
    #[serde(rename = "marker_name")]
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Unix epoch milliseconds, assigned by the store.
    pub created_at: i64,
}

impl Marker {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Label for notifications and lists: the name, or `Marker #<id>`.
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) => name.to_string(),
            None => format!("Marker #{}", self.id),
        }
    }

    /// Validates a record read back from storage.
    pub fn validate(&self) -> Result<(), MarkerValidationError> {
        self.coordinate().validate()?;
        if let Some(name) = self.name.as_deref() {
            normalize_marker_name(Some(name))?;
        }
        Ok(())
    }
}

/// Validation errors for marker input.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerValidationError {
    Coordinate(CoordinateError),
    NameTooLong { chars: usize, max: usize },
    EmptyImageUri,
}

impl Display for MarkerValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coordinate(err) => write!(f, "{err}"),
            Self::NameTooLong { chars, max } => {
                write!(f, "marker name has {chars} characters; maximum is {max}")
            }
            Self::EmptyImageUri => write!(f, "image uri must not be empty"),
        }
    }
}

impl Error for MarkerValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Coordinate(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CoordinateError> for MarkerValidationError {
    fn from(value: CoordinateError) -> Self {
        Self::Coordinate(value)
    }
}

/// Trims a marker label; blank labels collapse to `None`.
pub fn normalize_marker_name(name: Option<&str>) -> Result<Option<String>, MarkerValidationError> {
    let Some(trimmed) = name.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    let chars = trimmed.chars().count();
    if chars > MARKER_NAME_MAX_CHARS {
        return Err(MarkerValidationError::NameTooLong {
            chars,
            max: MARKER_NAME_MAX_CHARS,
        });
    }
    Ok(Some(trimmed.to_string()))
}

/// Result of a delete call; deleting a missing row is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

impl DeleteOutcome {
    pub(crate) fn from_changed_rows(changed: usize) -> Self {
        if changed == 0 {
            Self::NotFound
        } else {
            Self::Deleted
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::NotFound => "not_found",
        }
    }
}
