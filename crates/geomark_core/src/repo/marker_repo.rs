//! Marker/image repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide create/delete/list APIs over `markers` and `marker_images`.
//! - Keep cascade and reference checks inside the persistence boundary.
//!
//! # Invariants
//! - `delete_marker` removes the marker and its images in one transaction.
//! - `create_image` never inserts a row for a missing marker.
//! - Read paths reject invalid persisted coordinates instead of masking them.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::geo::Coordinate;
use crate::model::image::{normalize_image_uri, ImageId, MarkerImage};
use crate::model::marker::{normalize_marker_name, DeleteOutcome, Marker, MarkerId};
use crate::repo::{RepoError, RepoResult};
use log::{debug, info};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use std::path::Path;

const CREATED_AT_MS_SQL: &str =
    "COALESCE(CAST(strftime('%s', created_at) AS INTEGER) * 1000, 0) AS created_at_ms";

/// Repository interface for marker and image persistence.
pub trait MarkerRepository {
    fn create_marker(&mut self, latitude: f64, longitude: f64) -> RepoResult<Marker>;
    fn rename_marker(&mut self, id: MarkerId, name: Option<&str>) -> RepoResult<Marker>;
    fn delete_marker(&mut self, id: MarkerId) -> RepoResult<DeleteOutcome>;
    fn get_marker(&self, id: MarkerId) -> RepoResult<Option<Marker>>;
    fn list_markers(&self) -> RepoResult<Vec<Marker>>;
    fn create_image(&mut self, marker_id: MarkerId, uri: &str) -> RepoResult<MarkerImage>;
    fn delete_image(&mut self, id: ImageId) -> RepoResult<DeleteOutcome>;
    fn list_images(&self, marker_id: MarkerId) -> RepoResult<Vec<MarkerImage>>;
}

/// SQLite-backed marker repository owning its connection.
pub struct SqliteMarkerRepository {
    conn: Connection,
}

impl SqliteMarkerRepository {
    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens (or creates) the store file and applies migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        open_db(path).map(Self::new)
    }

    /// Opens a throwaway in-memory store.
    pub fn open_in_memory() -> Result<Self, DbError> {
        open_db_in_memory().map(Self::new)
    }

    /// Read-only access to the underlying connection for diagnostics.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn marker_exists(conn: &Connection, id: MarkerId) -> RepoResult<bool> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM markers WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl MarkerRepository for SqliteMarkerRepository {
    fn create_marker(&mut self, latitude: f64, longitude: f64) -> RepoResult<Marker> {
        Coordinate::new(latitude, longitude).validate()?;

        let marker = self.conn.query_row(
            &format!(
                "INSERT INTO markers (latitude, longitude) VALUES (?1, ?2)
                 RETURNING id, marker_name, latitude, longitude, {CREATED_AT_MS_SQL};"
            ),
            params![latitude, longitude],
            parse_marker_row,
        )?;

        info!(
            "event=marker_create module=repo status=ok marker_id={}",
            marker.id
        );
        Ok(marker)
    }

    fn rename_marker(&mut self, id: MarkerId, name: Option<&str>) -> RepoResult<Marker> {
        let name = normalize_marker_name(name)?;

        let marker = self
            .conn
            .query_row(
                &format!(
                    "UPDATE markers SET marker_name = ?2 WHERE id = ?1
                     RETURNING id, marker_name, latitude, longitude, {CREATED_AT_MS_SQL};"
                ),
                params![id, name],
                parse_marker_row,
            )
            .optional()?;

        marker.ok_or(RepoError::MarkerNotFound(id))
    }

    fn delete_marker(&mut self, id: MarkerId) -> RepoResult<DeleteOutcome> {
        let tx = self.conn.transaction()?;
        let images_removed = tx.execute("DELETE FROM marker_images WHERE marker_id = ?1;", [id])?;
        let changed = tx.execute("DELETE FROM markers WHERE id = ?1;", [id])?;
        tx.commit()?;

        let outcome = DeleteOutcome::from_changed_rows(changed);
        info!(
            "event=marker_delete module=repo status=ok marker_id={} outcome={} images_removed={}",
            id,
            outcome.as_str(),
            images_removed
        );
        Ok(outcome)
    }

    fn get_marker(&self, id: MarkerId) -> RepoResult<Option<Marker>> {
        let marker = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, marker_name, latitude, longitude, {CREATED_AT_MS_SQL}
                     FROM markers WHERE id = ?1;"
                ),
                [id],
                parse_marker_row,
            )
            .optional()?;

        match marker {
            Some(marker) => {
                marker.validate().map_err(|err| invalid_marker(&marker, &err))?;
                Ok(Some(marker))
            }
            None => Ok(None),
        }
    }

    fn list_markers(&self) -> RepoResult<Vec<Marker>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, marker_name, latitude, longitude, {CREATED_AT_MS_SQL}
             FROM markers ORDER BY id ASC;"
        ))?;
        let markers = stmt
            .query_map([], parse_marker_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for marker in &markers {
            marker.validate().map_err(|err| invalid_marker(marker, &err))?;
        }

        debug!(
            "event=marker_list module=repo status=ok count={}",
            markers.len()
        );
        Ok(markers)
    }

    fn create_image(&mut self, marker_id: MarkerId, uri: &str) -> RepoResult<MarkerImage> {
        let uri = normalize_image_uri(uri)?;

        let tx = self.conn.transaction()?;
        if !Self::marker_exists(&tx, marker_id)? {
            return Err(RepoError::MarkerNotFound(marker_id));
        }

        let inserted = tx.query_row(
            &format!(
                "INSERT INTO marker_images (marker_id, uri) VALUES (?1, ?2)
                 RETURNING id, marker_id, uri, {CREATED_AT_MS_SQL};"
            ),
            params![marker_id, uri],
            parse_image_row,
        );
        let image = match inserted {
            Ok(image) => image,
            Err(err) if is_foreign_key_violation(&err) => {
                return Err(RepoError::MarkerNotFound(marker_id));
            }
            Err(err) => return Err(err.into()),
        };
        tx.commit()?;

        info!(
            "event=image_create module=repo status=ok marker_id={} image_id={}",
            marker_id, image.id
        );
        Ok(image)
    }

    fn delete_image(&mut self, id: ImageId) -> RepoResult<DeleteOutcome> {
        let changed = self
            .conn
            .execute("DELETE FROM marker_images WHERE id = ?1;", [id])?;

        let outcome = DeleteOutcome::from_changed_rows(changed);
        info!(
            "event=image_delete module=repo status=ok image_id={} outcome={}",
            id,
            outcome.as_str()
        );
        Ok(outcome)
    }

    fn list_images(&self, marker_id: MarkerId) -> RepoResult<Vec<MarkerImage>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, marker_id, uri, {CREATED_AT_MS_SQL}
             FROM marker_images WHERE marker_id = ?1 ORDER BY id ASC;"
        ))?;
        let images = stmt
            .query_map([marker_id], parse_image_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(images)
    }
}

fn parse_marker_row(row: &Row<'_>) -> rusqlite::Result<Marker> {
    Ok(Marker {
        id: row.get("id")?,
        name: row.get("marker_name")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        created_at: row.get("created_at_ms")?,
    })
}

fn parse_image_row(row: &Row<'_>) -> rusqlite::Result<MarkerImage> {
    Ok(MarkerImage {
        id: row.get("id")?,
        marker_id: row.get("marker_id")?,
        uri: row.get("uri")?,
        created_at: row.get("created_at_ms")?,
    })
}

fn invalid_marker(marker: &Marker, err: &dyn std::fmt::Display) -> RepoError {
    RepoError::InvalidData(format!("marker {}: {err}", marker.id))
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

#[cfg(test)]
mod tests {
    use super::is_foreign_key_violation;
    use crate::db::open_db_in_memory;

    #[test]
    fn only_foreign_key_failures_count_as_missing_marker() {
        let conn = open_db_in_memory().expect("in-memory db");

        let orphan = conn
            .execute(
                "INSERT INTO marker_images (marker_id, uri) VALUES (404, 'file:///orphan.jpg');",
                [],
            )
            .expect_err("foreign key enforced");
        assert!(is_foreign_key_violation(&orphan));

        conn.execute(
            "INSERT INTO markers (latitude, longitude) VALUES (1.0, 1.0);",
            [],
        )
        .expect("marker row");
        let null_uri = conn
            .execute(
                "INSERT INTO marker_images (marker_id, uri) VALUES (1, NULL);",
                [],
            )
            .expect_err("uri is NOT NULL");
        assert!(!is_foreign_key_violation(&null_uri));
    }
}
