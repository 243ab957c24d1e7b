//! In-memory checkpoint store.
//!
//! Useful for testing and for runs that should not persist progress.

use super::{CheckpointRecord, CheckpointStore};
use crate::artifact::Locator;
use crate::error::{Result, VidpipeError};
use crate::job::Stage;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

/// In-memory checkpoint store.
pub struct MemoryCheckpointStore {
    records: Mutex<HashMap<String, CheckpointRecord>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, CheckpointRecord>>> {
        self.records
            .lock()
            .map_err(|e| VidpipeError::Checkpoint(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_status(&self, url: &str) -> Result<BTreeSet<Stage>> {
        let records = self.lock()?;
        Ok(records
            .get(url)
            .map(|r| r.stages_completed())
            .unwrap_or_default())
    }

    async fn get_record(&self, url: &str) -> Result<Option<CheckpointRecord>> {
        Ok(self.lock()?.get(url).cloned())
    }

    async fn mark_stage_complete(
        &self,
        url: &str,
        stage: Stage,
        artifact: &Locator,
    ) -> Result<()> {
        let mut records = self.lock()?;

        if let Some(pred) = stage.predecessor() {
            let done = records.get(url).is_some_and(|r| r.is_complete(pred));
            if !done {
                return Err(VidpipeError::Checkpoint(format!(
                    "Cannot complete {} for {}: {} is not complete",
                    stage, url, pred
                )));
            }
        }

        let record = records
            .entry(url.to_string())
            .or_insert_with(|| CheckpointRecord::new(url));
        record.stage_artifacts.insert(stage, artifact.clone());
        if record.failed_stage == Some(stage) {
            record.failed_stage = None;
            record.last_error = None;
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_stage_failed(&self, url: &str, stage: Stage, error: &str) -> Result<()> {
        let mut records = self.lock()?;
        let record = records
            .entry(url.to_string())
            .or_insert_with(|| CheckpointRecord::new(url));
        record.failed_stage = Some(stage);
        record.last_error = Some(error.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn resolve_artifact(&self, url: &str, stage: Stage) -> Result<Option<Locator>> {
        let records = self.lock()?;
        Ok(records
            .get(url)
            .and_then(|r| r.stage_artifacts.get(&stage).cloned()))
    }

    async fn record_title(&self, url: &str, title: &str) -> Result<()> {
        let mut records = self.lock()?;
        let record = records
            .entry(url.to_string())
            .or_insert_with(|| CheckpointRecord::new(url));
        record.title = Some(title.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<CheckpointRecord>> {
        let mut records: Vec<_> = self.lock()?.values().cloned().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[tokio::test]
    async fn test_unknown_url_is_empty() {
        contract::unknown_url_is_empty(&MemoryCheckpointStore::new()).await;
    }

    #[tokio::test]
    async fn test_completion_is_idempotent() {
        contract::completion_is_idempotent(&MemoryCheckpointStore::new()).await;
    }

    #[tokio::test]
    async fn test_rejects_out_of_order() {
        contract::rejects_out_of_order(&MemoryCheckpointStore::new()).await;
    }

    #[tokio::test]
    async fn test_failure_keeps_completed_stages() {
        contract::failure_keeps_completed_stages(&MemoryCheckpointStore::new()).await;
    }

    #[tokio::test]
    async fn test_title_and_listing() {
        contract::title_and_listing(&MemoryCheckpointStore::new()).await;
    }
}
