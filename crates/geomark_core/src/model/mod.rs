//! Domain model for markers and their attached images.
//!
//! # Responsibility
//! - Define canonical records shared by the store, the façade and the monitor.
//! - Own input validation rules applied before any persistence.
//!
//! # Invariants
//! - Ids are store-assigned integers and are never reused.
//! - An image always belongs to exactly one persisted marker.

pub mod image;
pub mod marker;
