//! Navigation routes and the initial map region.
//!
//! The host owns rendering and transitions; core only defines what each
//! route carries.

use crate::geo::Coordinate;
use crate::model::marker::{Marker, MarkerId};
use crate::ports::LocationProvider;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Map viewport centered on a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapRegion {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl Default for MapRegion {
    fn default() -> Self {
        Self {
            latitude: 37.78825,
            longitude: -122.4324,
            latitude_delta: 0.0922,
            longitude_delta: 0.0421,
        }
    }
}

impl MapRegion {
    /// Same zoom, new center.
    pub fn centered_on(self, center: Coordinate) -> Self {
        Self {
            latitude: center.latitude,
            longitude: center.longitude,
            ..self
        }
    }
}

/// Logical screens of the app.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Route {
    Map,
    MarkerDetail {
        marker_id: MarkerId,
        marker_latitude: f64,
        marker_longitude: f64,
    },
}

impl Route {
    pub fn marker_detail(marker: &Marker) -> Self {
        Self::MarkerDetail {
            marker_id: marker.id,
            marker_latitude: marker.latitude,
            marker_longitude: marker.longitude,
        }
    }

    /// Every route returns to the map.
    pub fn back(self) -> Self {
        Self::Map
    }
}

/// Region to show on launch: the device position when permitted, else the
/// default region.
pub async fn initial_region(location: &dyn LocationProvider) -> MapRegion {
    let region = MapRegion::default();
    if !location.request_permission().await.is_granted() {
        warn!("event=initial_region module=screen status=skip reason=location_permission_denied");
        return region;
    }

    match location.current_position().await {
        Ok(position) if position.validate().is_ok() => {
            info!("event=initial_region module=screen status=ok source=device");
            region.centered_on(position)
        }
        Ok(_) => {
            warn!("event=initial_region module=screen status=skip reason=invalid_position");
            region
        }
        Err(err) => {
            warn!(
                "event=initial_region module=screen status=error error={}",
                err
            );
            region
        }
    }
}
