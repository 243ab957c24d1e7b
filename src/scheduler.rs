//! Bounded-concurrency job scheduling.

use crate::job::Job;
use crate::orchestrator::{JobResult, Orchestrator};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error};

/// Runs jobs through an orchestrator with at most `max_concurrency` in flight.
///
/// Each job runs on its own task, so a panic in one job becomes a failed
/// result for that job and never touches the others.
pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    max_concurrency: usize,
}

impl WorkerPool {
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrency: usize) -> Self {
        Self {
            orchestrator,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Start `jobs` and yield results in completion order.
    ///
    /// Jobs not yet started when the orchestrator's token is cancelled are
    /// reported as cancelled without running.
    pub fn run(&self, jobs: Vec<Job>) -> impl Stream<Item = JobResult> + Send + 'static {
        let orchestrator = self.orchestrator.clone();
        let cancel = orchestrator.cancellation_token();

        stream::iter(jobs)
            .map(move |job| {
                let orchestrator = orchestrator.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        debug!("Skipping {}: batch cancelled", job.url);
                        return JobResult::cancelled(&job);
                    }

                    let task_job = job.clone();
                    let handle = tokio::spawn(async move { orchestrator.process(&task_job).await });
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            error!("Job for {} aborted: {}", job.url, e);
                            JobResult::aborted(&job, &e.to_string())
                        }
                    }
                }
            })
            .buffer_unordered(self.max_concurrency)
    }

    /// Run `jobs` to completion and return results in input order.
    pub async fn run_all(&self, jobs: Vec<Job>) -> Vec<JobResult> {
        let mut results: Vec<JobResult> = self.run(jobs).collect().await;
        results.sort_by_key(|r| r.position);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactStore, FsArtifactStore, Locator};
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::job::Stage;
    use crate::stage::{StageExecutor, StageOutput, StageRun, StageRunner};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps, then writes a marker. Tracks peak concurrency.
    struct SlowDownload {
        artifacts: Arc<dyn ArtifactStore>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl StageRunner for SlowDownload {
        fn stage(&self) -> Stage {
            Stage::Download
        }

        async fn existing(&self, _job: &Job) -> Option<Locator> {
            None
        }

        async fn run(&self, job: &Job, _input: Option<&Locator>, _executor: &StageExecutor) -> StageRun<StageOutput> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            if job.url.contains("boom") {
                panic!("strategy bug");
            }
            let locator = Locator::download(&job.key, "mp3");
            self.artifacts.write_text(&locator, "audio").await.unwrap();
            self.active.fetch_sub(1, Ordering::SeqCst);
            StageRun::completed(StageOutput::new(locator), Vec::new())
        }
    }

    fn pool(dir: &std::path::Path, limit: usize) -> (WorkerPool, Arc<SlowDownload>) {
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir).unwrap());
        let runner = Arc::new(SlowDownload {
            artifacts: artifacts.clone(),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryCheckpointStore::new()),
            artifacts,
            vec![runner.clone()],
            StageExecutor::default(),
        );
        (WorkerPool::new(Arc::new(orchestrator), limit), runner)
    }

    fn jobs(urls: &[&str]) -> Vec<Job> {
        urls.iter().enumerate().map(|(i, u)| Job::new(*u, i)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, runner) = pool(dir.path(), 2);
        let urls: Vec<String> = (0..6).map(|i| format!("https://example.com/{}.mp3", i)).collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();

        let results = pool.run_all(jobs(&refs)).await;

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.failure.is_none()));
        assert_eq!(runner.peak.load(Ordering::SeqCst), 2);
        let positions: Vec<usize> = results.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, _runner) = pool(dir.path(), 3);

        let results = pool
            .run_all(jobs(&[
                "https://example.com/a.mp3",
                "https://example.com/boom.mp3",
                "https://example.com/c.mp3",
            ]))
            .await;

        assert!(results[0].failure.is_none());
        assert!(results[2].failure.is_none());
        let failure = results[1].failure.as_ref().unwrap();
        assert_eq!(failure.kind(), crate::stage::FailureKind::Internal);
        assert!(failure.stage.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_batch_starts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, runner) = pool(dir.path(), 2);
        pool.orchestrator.cancellation_token().cancel();

        let results = pool
            .run_all(jobs(&["https://example.com/a.mp3", "https://example.com/b.mp3"]))
            .await;

        assert!(results
            .iter()
            .all(|r| r.failure.as_ref().map(|f| f.kind()) == Some(crate::stage::FailureKind::Cancelled)));
        assert_eq!(runner.peak.load(Ordering::SeqCst), 0);
    }
}
