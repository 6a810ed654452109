//! Marker/image façade.
//!
//! # Responsibility
//! - Single call surface for UI-facing collaborators.
//! - Own the in-memory marker cache and per-marker image cache.
//! - Publish marker snapshots to the proximity monitor.
//!
//! # Invariants
//! - Every mutating call re-fetches the affected collection from the store
//!   before returning, so the cache never lags behind a completed write.
//! - The published snapshot is `None` until `load()` succeeds once.
//! - Storage and reference errors are recorded into the shared `ErrorSlot`.

use crate::error::{CoreError, CoreResult, ErrorReport, ErrorSlot};
use crate::model::image::{ImageId, MarkerImage};
use crate::model::marker::{DeleteOutcome, Marker, MarkerId};
use crate::permission::PlatformPermission;
use crate::ports::{MediaPicker, PickOutcome};
use crate::repo::marker_repo::MarkerRepository;
use crate::repo::RepoResult;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Immutable marker set shared with readers.
pub type MarkerSnapshot = Arc<Vec<Marker>>;
/// Receiving side of the snapshot channel; `None` until the first load.
pub type SnapshotReceiver = watch::Receiver<Option<MarkerSnapshot>>;

/// Use-case façade over a marker repository.
pub struct MarkerService<R: MarkerRepository> {
    repo: R,
    markers: MarkerSnapshot,
    images: HashMap<MarkerId, Vec<MarkerImage>>,
    snapshot_tx: watch::Sender<Option<MarkerSnapshot>>,
    errors: ErrorSlot,
}

impl<R: MarkerRepository> MarkerService<R> {
    /// Creates a façade with an empty, not-yet-loaded cache.
    pub fn new(repo: R, errors: ErrorSlot) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        Self {
            repo,
            markers: Arc::new(Vec::new()),
            images: HashMap::new(),
            snapshot_tx,
            errors,
        }
    }

    /// Initial fetch at application start.
    pub fn load(&mut self) -> CoreResult<MarkerSnapshot> {
        let result = self.refresh_markers();
        self.track(result)
    }

    /// New receiver for the monitor; sees the latest snapshot immediately.
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.snapshot_tx.subscribe()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot_tx.borrow().is_some()
    }

    /// Cached snapshot; no storage access.
    pub fn current_markers(&self) -> MarkerSnapshot {
        Arc::clone(&self.markers)
    }

    /// Cached lookup by id.
    pub fn marker(&self, id: MarkerId) -> Option<Marker> {
        self.markers.iter().find(|marker| marker.id == id).cloned()
    }

    /// Persists a marker at the long-pressed coordinate.
    pub fn add_marker(&mut self, latitude: f64, longitude: f64) -> CoreResult<Marker> {
        let result = self
            .repo
            .create_marker(latitude, longitude)
            .and_then(|marker| self.refresh_markers().map(|_| marker));
        self.track(result)
    }

    /// Sets or clears the marker label.
    pub fn rename_marker(&mut self, id: MarkerId, name: Option<&str>) -> CoreResult<Marker> {
        let result = self
            .repo
            .rename_marker(id, name)
            .and_then(|marker| self.refresh_markers().map(|_| marker));
        self.track(result)
    }

    /// Deletes a marker and its images; a missing id is `NotFound`, not an error.
    pub fn remove_marker(&mut self, id: MarkerId) -> CoreResult<DeleteOutcome> {
        let result = self.repo.delete_marker(id).and_then(|outcome| {
            self.images.remove(&id);
            self.refresh_markers().map(|_| outcome)
        });
        self.track(result)
    }

    /// Attaches an image reference to an existing marker.
    pub fn add_image(&mut self, marker_id: MarkerId, uri: &str) -> CoreResult<MarkerImage> {
        let result = self
            .repo
            .create_image(marker_id, uri)
            .and_then(|image| self.refresh_images(marker_id).map(|_| image));
        self.track(result)
    }

    /// Removes one image; `marker_id` selects which cached gallery to refresh.
    pub fn remove_image(&mut self, id: ImageId, marker_id: MarkerId) -> CoreResult<DeleteOutcome> {
        let result = self
            .repo
            .delete_image(id)
            .and_then(|outcome| self.refresh_images(marker_id).map(|_| outcome));
        self.track(result)
    }

    /// Images for one marker, fetched on first access and cached afterwards.
    pub fn images_for(&mut self, marker_id: MarkerId) -> CoreResult<Vec<MarkerImage>> {
        if let Some(images) = self.images.get(&marker_id) {
            return Ok(images.clone());
        }
        let result = self.refresh_images(marker_id);
        self.track(result)
    }

    /// Runs the permission-gated picker and attaches the selection.
    ///
    /// Returns `Ok(None)` when the user cancels the picker.
    pub async fn attach_picked_image(
        &mut self,
        marker_id: MarkerId,
        picker: &dyn MediaPicker,
    ) -> CoreResult<Option<MarkerImage>> {
        if self.marker(marker_id).is_none() {
            let err = CoreError::Reference(marker_id);
            self.errors.record(&err);
            return Err(err);
        }

        if !picker.request_permission().await.is_granted() {
            warn!(
                "event=image_pick module=service status=error error_code=media_permission_denied marker_id={}",
                marker_id
            );
            return Err(CoreError::PermissionDenied(
                PlatformPermission::MediaLibrary,
            ));
        }

        match picker.pick_image().await? {
            PickOutcome::Selected(uri) => self.add_image(marker_id, &uri).map(Some),
            PickOutcome::Cancelled => {
                info!(
                    "event=image_pick module=service status=skip reason=cancelled marker_id={}",
                    marker_id
                );
                Ok(None)
            }
        }
    }

    /// Most recent recorded failure, for display.
    pub fn last_error(&self) -> Option<ErrorReport> {
        self.errors.last()
    }

    /// Clears the slot once the UI has shown the failure.
    pub fn clear_error(&self) -> Option<ErrorReport> {
        self.errors.take()
    }

    pub fn errors(&self) -> &ErrorSlot {
        &self.errors
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    fn refresh_markers(&mut self) -> RepoResult<MarkerSnapshot> {
        let markers = Arc::new(self.repo.list_markers()?);
        self.markers = Arc::clone(&markers);
        self.images
            .retain(|marker_id, _| markers.iter().any(|marker| marker.id == *marker_id));
        self.snapshot_tx.send_replace(Some(Arc::clone(&markers)));
        Ok(markers)
    }

    fn refresh_images(&mut self, marker_id: MarkerId) -> RepoResult<Vec<MarkerImage>> {
        let images = self.repo.list_images(marker_id)?;
        self.images.insert(marker_id, images.clone());
        Ok(images)
    }

    fn track<T>(&self, result: RepoResult<T>) -> CoreResult<T> {
        result.map_err(|err| {
            let err = CoreError::from(err);
            warn!(
                "event=service_call module=service status=error error_kind={} error={}",
                err.kind().as_str(),
                err
            );
            self.errors.record(&err);
            err
        })
    }
}
