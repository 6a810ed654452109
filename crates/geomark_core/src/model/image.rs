//! Image attachment model.
//!
//! The store keeps only an opaque reference (`uri`) to photo content;
//! image bytes stay with the platform media library.

use crate::model::marker::{MarkerId, MarkerValidationError};
use serde::{Deserialize, Serialize};

/// Store-assigned image identifier.
pub type ImageId = i64;

/// Photo reference attached to a marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerImage {
    pub id: ImageId,
    pub marker_id: MarkerId,
    /// Platform-local file path or content URI.
    pub uri: String,
    /// Unix epoch milliseconds, assigned by the store.
    pub created_at: i64,
}

/// Trims an image reference and rejects blank values.
pub fn normalize_image_uri(uri: &str) -> Result<String, MarkerValidationError> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return Err(MarkerValidationError::EmptyImageUri);
    }
    Ok(trimmed.to_string())
}
