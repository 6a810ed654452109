//! Proximity detection: configuration, alert gating and the tracking monitor.
//!
//! # Responsibility
//! - Turn a stream of device positions into at-most-once-per-entry alerts.
//!
//! # Invariants
//! - Distance is haversine great-circle distance in meters.
//! - A marker at exactly `radius_m` counts as inside.

pub mod config;
pub mod gate;
pub mod monitor;
