//! SQLite-backed impression counters.

use super::schema::IMPRESSIONS_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct SqliteImpressionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImpressionStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, IMPRESSIONS_VERSIONED_SCHEMAS, "impressions")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        IMPRESSIONS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Add `count` impressions to a subject and return its new total.
    pub fn increment(&self, subject_id: i64, count: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let total = conn
            .query_row(
                "INSERT INTO impression_counters (subject_id, impressions, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(subject_id) DO UPDATE SET
                    impressions = impressions + excluded.impressions,
                    updated_at = excluded.updated_at
                 RETURNING impressions",
                params![subject_id, count, Utc::now().timestamp_millis()],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to count impressions of subject {}", subject_id))?;
        Ok(total)
    }

    /// Total impressions of a subject, 0 if it was never seen.
    pub fn get(&self, subject_id: i64) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let total = conn
            .query_row(
                "SELECT impressions FROM impression_counters WHERE subject_id = ?1",
                params![subject_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(total.unwrap_or(0))
    }
}
