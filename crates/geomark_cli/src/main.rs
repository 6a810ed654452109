//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `geomark_core` linkage.
//! - Optionally summarize a marker database given as the first argument.
//! - Keep output deterministic for quick local sanity checks.

use geomark_core::{MarkerRepository, SqliteMarkerRepository};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("geomark_core ping={}", geomark_core::ping());
    println!("geomark_core version={}", geomark_core::core_version());

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };

    match summarize(&db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("geomark_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn summarize(db_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let repo = SqliteMarkerRepository::open(db_path)?;
    let markers = repo.list_markers()?;
    println!("markers={}", markers.len());
    for marker in &markers {
        let images = repo.list_images(marker.id)?;
        println!(
            "marker id={} label={:?} images={}",
            marker.id,
            marker.display_name(),
            images.len()
        );
    }
    Ok(())
}
