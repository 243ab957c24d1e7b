//! SQLite-backed checkpoint store.
//!
//! The connection sits behind a mutex, so every physical write is
//! serialized even when many workers checkpoint at once.

use super::{CheckpointRecord, CheckpointStore};
use crate::artifact::Locator;
use crate::error::{Result, VidpipeError};
use crate::job::Stage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        url TEXT PRIMARY KEY,
        title TEXT,
        last_error TEXT,
        failed_stage TEXT,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS stages (
        url TEXT NOT NULL,
        stage TEXT NOT NULL,
        artifact TEXT NOT NULL,
        completed_at TEXT NOT NULL,
        PRIMARY KEY (url, stage)
    );

    CREATE INDEX IF NOT EXISTS idx_jobs_updated_at ON jobs(updated_at);
"#;

/// SQLite checkpoint store.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open (or create) the store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened checkpoint store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| VidpipeError::Checkpoint(format!("Failed to acquire lock: {}", e)))
    }

    fn touch(conn: &Connection, url: &str, now: &str) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO jobs (url, updated_at) VALUES (?1, ?2)
            ON CONFLICT(url) DO UPDATE SET updated_at = excluded.updated_at
            "#,
            params![url, now],
        )?;
        Ok(())
    }

    fn parse_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn load_record(conn: &Connection, url: &str) -> Result<Option<CheckpointRecord>> {
        let row = conn
            .query_row(
                "SELECT title, last_error, failed_stage, updated_at FROM jobs WHERE url = ?1",
                params![url],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((title, last_error, failed_stage, updated_at)) = row else {
            return Ok(None);
        };

        let mut record = CheckpointRecord::new(url);
        record.title = title;
        record.last_error = last_error;
        record.failed_stage = failed_stage.map(|s| s.parse()).transpose()?;
        record.updated_at = Self::parse_time(&updated_at);

        let mut stmt = conn.prepare("SELECT stage, artifact FROM stages WHERE url = ?1")?;
        let rows = stmt.query_map(params![url], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (stage, artifact) = row?;
            record
                .stage_artifacts
                .insert(stage.parse()?, Locator::new(artifact));
        }

        Ok(Some(record))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get_status(&self, url: &str) -> Result<BTreeSet<Stage>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT stage FROM stages WHERE url = ?1")?;
        let rows = stmt.query_map(params![url], |row| row.get::<_, String>(0))?;

        let mut stages: BTreeSet<Stage> = BTreeSet::new();
        for row in rows {
            stages.insert(row?.parse()?);
        }
        Ok(stages)
    }

    async fn get_record(&self, url: &str) -> Result<Option<CheckpointRecord>> {
        let conn = self.lock()?;
        Self::load_record(&conn, url)
    }

    #[instrument(skip(self, artifact))]
    async fn mark_stage_complete(
        &self,
        url: &str,
        stage: Stage,
        artifact: &Locator,
    ) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        if let Some(pred) = stage.predecessor() {
            let done: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM stages WHERE url = ?1 AND stage = ?2)",
                params![url, pred.as_str()],
                |row| row.get(0),
            )?;
            if !done {
                return Err(VidpipeError::Checkpoint(format!(
                    "Cannot complete {} for {}: {} is not complete",
                    stage, url, pred
                )));
            }
        }

        let now = Utc::now().to_rfc3339();
        Self::touch(&tx, url, &now)?;
        tx.execute(
            r#"
            INSERT INTO stages (url, stage, artifact, completed_at) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(url, stage) DO UPDATE SET artifact = excluded.artifact
            "#,
            params![url, stage.as_str(), artifact.as_str(), now],
        )?;
        tx.execute(
            r#"
            UPDATE jobs SET last_error = NULL, failed_stage = NULL
            WHERE url = ?1 AND failed_stage = ?2
            "#,
            params![url, stage.as_str()],
        )?;
        tx.commit()?;

        debug!("Checkpointed {} for {}", stage, url);
        Ok(())
    }

    #[instrument(skip(self, error))]
    async fn mark_stage_failed(&self, url: &str, stage: Stage, error: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO jobs (url, last_error, failed_stage, updated_at) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(url) DO UPDATE SET
                last_error = excluded.last_error,
                failed_stage = excluded.failed_stage,
                updated_at = excluded.updated_at
            "#,
            params![url, error, stage.as_str(), now],
        )?;
        Ok(())
    }

    async fn resolve_artifact(&self, url: &str, stage: Stage) -> Result<Option<Locator>> {
        let conn = self.lock()?;
        let artifact = conn
            .query_row(
                "SELECT artifact FROM stages WHERE url = ?1 AND stage = ?2",
                params![url, stage.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(artifact.map(Locator::new))
    }

    async fn record_title(&self, url: &str, title: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO jobs (url, title, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(url) DO UPDATE SET title = excluded.title, updated_at = excluded.updated_at
            "#,
            params![url, title, now],
        )?;
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<CheckpointRecord>> {
        let conn = self.lock()?;
        let urls: Vec<String> = {
            let mut stmt = conn.prepare("SELECT url FROM jobs ORDER BY updated_at DESC")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        let mut records = Vec::with_capacity(urls.len());
        for url in urls {
            if let Some(record) = Self::load_record(&conn, &url)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
