//! Checkpoint store: durable per-URL stage progress.
//!
//! Completion is monotonic. A stage row is only ever inserted or has its
//! locator refreshed, never removed, and a stage may only be marked
//! complete once its predecessor is.

mod memory;
mod sqlite;

pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use crate::artifact::Locator;
use crate::error::Result;
use crate::job::Stage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Persistent progress record for one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub url: String,
    /// Title reported by the download backend, if any.
    pub title: Option<String>,
    pub stage_artifacts: BTreeMap<Stage, Locator>,
    pub last_error: Option<String>,
    /// Stage that produced `last_error`.
    pub failed_stage: Option<Stage>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            stage_artifacts: BTreeMap::new(),
            last_error: None,
            failed_stage: None,
            updated_at: Utc::now(),
        }
    }

    /// Completed stages, in execution order.
    pub fn stages_completed(&self) -> BTreeSet<Stage> {
        self.stage_artifacts.keys().copied().collect()
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.stage_artifacts.contains_key(&stage)
    }
}

/// Durable record of per-URL, per-stage completion.
///
/// Implementations must serialize their physical writes; callers only
/// guarantee that a single URL is never in flight in two workers.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Completed stages for `url`; empty if never attempted.
    async fn get_status(&self, url: &str) -> Result<BTreeSet<Stage>>;

    /// Full record for `url`.
    async fn get_record(&self, url: &str) -> Result<Option<CheckpointRecord>>;

    /// Mark `stage` complete with its artifact. Idempotent.
    ///
    /// Fails with a `Checkpoint` error if the predecessor stage is not complete.
    async fn mark_stage_complete(&self, url: &str, stage: Stage, artifact: &Locator)
        -> Result<()>;

    /// Record a terminal stage failure without touching completion state.
    async fn mark_stage_failed(&self, url: &str, stage: Stage, error: &str) -> Result<()>;

    /// Locator recorded for a completed stage.
    async fn resolve_artifact(&self, url: &str, stage: Stage) -> Result<Option<Locator>>;

    /// Remember the media title for `url`.
    async fn record_title(&self, url: &str, title: &str) -> Result<()>;

    /// All records, most recently updated first.
    async fn list_records(&self) -> Result<Vec<CheckpointRecord>>;
}
