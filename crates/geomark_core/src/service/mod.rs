//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into UI-facing operations.
//! - Keep UI/FFI layers decoupled from storage details.

pub mod marker_service;
