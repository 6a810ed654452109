//! Flutter bridge crate for GeoMark.

pub mod api;
