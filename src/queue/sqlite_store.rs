//! SQLite-backed job queue.

use super::schema::JOB_QUEUE_VERSIONED_SCHEMAS;
use super::{DurableQueue, JobEnvelope, QueueCategory};
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Owns the job queue database. Hand out one [`CategoryQueue`] per category.
#[derive(Clone)]
pub struct SqliteJobQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobQueueStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, JOB_QUEUE_VERSIONED_SCHEMAS, "job queue")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        JOB_QUEUE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn queue(&self, category: QueueCategory) -> CategoryQueue {
        CategoryQueue {
            conn: self.conn.clone(),
            category,
        }
    }
}

/// View of the job queue restricted to one category.
pub struct CategoryQueue {
    conn: Arc<Mutex<Connection>>,
    category: QueueCategory,
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl DurableQueue for CategoryQueue {
    fn category(&self) -> QueueCategory {
        self.category
    }

    fn enqueue(&self, jobs: Vec<JobEnvelope>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO job_queue (id, category, label, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for job in &jobs {
                stmt.execute(params![
                    job.id,
                    self.category.as_str(),
                    job.label,
                    job.payload,
                    job.created.timestamp_millis()
                ])
                .with_context(|| format!("Failed to enqueue {} job {}", self.category, job.id))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<JobEnvelope>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, label, payload, created_at FROM job_queue \
             WHERE category = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let jobs = stmt
            .query_map(params![self.category.as_str()], |row| {
                Ok(JobEnvelope {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    payload: row.get(2)?,
                    created: millis_to_datetime(row.get(3)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn remove(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt =
                tx.prepare("DELETE FROM job_queue WHERE id = ?1 AND category = ?2")?;
            for id in ids {
                removed += stmt.execute(params![id, self.category.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn claim(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM job_queue WHERE id = ?1 AND category = ?2",
            params![id, self.category.as_str()],
        )?;
        Ok(removed == 1)
    }

    fn depth(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_queue WHERE category = ?1",
            params![self.category.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
