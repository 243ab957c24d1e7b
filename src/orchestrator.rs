//! Per-URL pipeline orchestration.
//!
//! Each job walks Download → Transcription → Summary. Before a stage runs
//! the checkpoint store is consulted; a completed stage whose artifact is
//! still present is skipped, and one whose artifact vanished is re-run.
//! A failed stage is recorded and ends the run. Whole runs are retried
//! with linear backoff, which is cheap because completed stages are skipped.

use crate::artifact::{ArtifactStore, FsArtifactStore, Locator};
use crate::audio::FfmpegSegmenter;
use crate::checkpoint::CheckpointStore;
use crate::config::{Prompts, Settings};
use crate::download::{build_download_strategies, DownloadStage};
use crate::error::Result;
use crate::job::{Job, Stage};
use crate::retry::RetryPolicy;
use crate::stage::{
    FailureKind, StageAttempt, StageExecutor, StageFailure, StageOutcome, StageRunner,
};
use crate::summarization::{build_summarization_strategies, SummaryStage};
use crate::transcription::{build_transcription_strategies, TranscriptionStage};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// The stage that stopped a job, and why.
#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    /// `None` when the job never reached a stage (cancelled before start, panic).
    pub stage: Option<Stage>,
    #[serde(flatten)]
    pub failure: StageFailure,
}

impl JobFailure {
    pub fn at(stage: Stage, failure: StageFailure) -> Self {
        Self {
            stage: Some(stage),
            failure,
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.failure.kind
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} stage: {}", stage, self.failure),
            None => write!(f, "{}", self.failure),
        }
    }
}

/// Final state of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub url: String,
    pub position: usize,
    pub key: String,
    pub title: Option<String>,
    /// Completed stages and their artifacts.
    pub stages: BTreeMap<Stage, Locator>,
    /// Stages satisfied by an earlier run without invoking any strategy.
    pub skipped: Vec<Stage>,
    pub failure: Option<JobFailure>,
    /// Whole-job runs made.
    pub runs: u32,
    pub attempts: Vec<StageAttempt>,
}

impl JobResult {
    pub fn new(job: &Job) -> Self {
        Self {
            url: job.url.clone(),
            position: job.position,
            key: job.key.clone(),
            title: None,
            stages: BTreeMap::new(),
            skipped: Vec::new(),
            failure: None,
            runs: 0,
            attempts: Vec::new(),
        }
    }

    /// A job that never started because the batch was cancelled.
    pub fn cancelled(job: &Job) -> Self {
        let mut result = Self::new(job);
        result.failure = Some(JobFailure {
            stage: None,
            failure: StageFailure::cancelled(),
        });
        result
    }

    /// A job whose task died without producing a result.
    pub fn aborted(job: &Job, reason: &str) -> Self {
        let mut result = Self::new(job);
        result.failure = Some(JobFailure {
            stage: None,
            failure: StageFailure::new(
                FailureKind::Internal,
                vec![crate::stage::StrategyError {
                    strategy: "worker".to_string(),
                    class: crate::error::ErrorClass::Transient,
                    message: reason.to_string(),
                }],
            ),
        });
        result
    }

    /// All stages complete.
    pub fn is_done(&self) -> bool {
        Stage::ALL.iter().all(|s| self.stages.contains_key(s))
    }
}

/// Drives single jobs through the stage runners.
pub struct Orchestrator {
    checkpoints: Arc<dyn CheckpointStore>,
    artifacts: Arc<dyn ArtifactStore>,
    runners: Vec<Arc<dyn StageRunner>>,
    executor: StageExecutor,
    job_retries: u32,
    job_retry_delay: Duration,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator over explicit components. Runners are sorted
    /// into stage order.
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        artifacts: Arc<dyn ArtifactStore>,
        mut runners: Vec<Arc<dyn StageRunner>>,
        executor: StageExecutor,
    ) -> Self {
        runners.sort_by_key(|r| r.stage());
        Self {
            checkpoints,
            artifacts,
            runners,
            executor,
            job_retries: 1,
            job_retry_delay: Duration::ZERO,
            cancel: CancellationToken::new(),
        }
    }

    /// Build the production pipeline from settings.
    pub fn from_settings(settings: &Settings, checkpoints: Arc<dyn CheckpointStore>) -> Result<Self> {
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(settings.output_dir())?);
        let prompts = Arc::new(Prompts::load(settings.summarization.prompts_dir.as_deref())?);
        let tx = &settings.transcription;

        let runners: Vec<Arc<dyn StageRunner>> = vec![
            Arc::new(DownloadStage::new(
                build_download_strategies(&settings.download)?,
                artifacts.clone(),
            )),
            Arc::new(
                TranscriptionStage::new(build_transcription_strategies(tx)?, artifacts.clone())
                    .with_segmenter(
                        Arc::new(FfmpegSegmenter),
                        tx.segment_duration_seconds,
                        tx.segment_worker_count,
                    ),
            ),
            Arc::new(
                SummaryStage::new(
                    build_summarization_strategies(&settings.summarization, prompts)?,
                    artifacts.clone(),
                )
                .with_translations(settings.summarization.translate_to.clone()),
            ),
        ];

        let executor = StageExecutor::new(RetryPolicy::from_settings(&settings.pipeline));

        Ok(Self::new(checkpoints, artifacts, runners, executor).with_job_retries(
            settings.pipeline.job_retries,
            settings.pipeline.retry_base_delay(),
        ))
    }

    /// Retry whole failed runs up to `retries` runs in total.
    pub fn with_job_retries(mut self, retries: u32, base_delay: Duration) -> Self {
        self.job_retries = retries.max(1);
        self.job_retry_delay = base_delay;
        self
    }

    /// Use `token` to cancel in-flight work.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn checkpoints(&self) -> Arc<dyn CheckpointStore> {
        self.checkpoints.clone()
    }

    /// Process one job to completion or terminal failure.
    #[instrument(skip(self, job), fields(url = %job.url))]
    pub async fn process(&self, job: &Job) -> JobResult {
        let mut result = JobResult::new(job);

        if let Ok(Some(record)) = self.checkpoints.get_record(&job.url).await {
            result.title = record.title;
        }

        for run in 1..=self.job_retries {
            result.runs = run;

            let Some(failure) = self.run_once(job, &mut result).await else {
                result.failure = None;
                info!("Finished {}", job.url);
                return result;
            };

            let retryable = matches!(
                failure.kind(),
                FailureKind::AllStrategiesExhausted | FailureKind::Internal
            );
            warn!("Run {}/{} for {} failed: {}", run, self.job_retries, job.url, failure);
            result.failure = Some(failure);

            if !retryable || run == self.job_retries || self.cancel.is_cancelled() {
                break;
            }

            let delay = self.job_retry_delay * run;
            info!("Retrying {} in {:?}", job.url, delay);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        result
    }

    /// Let a skipped stage fill in its optional outputs.
    async fn complete_existing(&self, runner: &dyn StageRunner, job: &Job, output: &Locator) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = runner.complete_existing(job, output, &self.executor) => {}
        }
    }

    /// One pass over the stages. Returns the failure that stopped it, if any.
    async fn run_once(&self, job: &Job, result: &mut JobResult) -> Option<JobFailure> {
        let mut input: Option<Locator> = None;

        for runner in &self.runners {
            let stage = runner.stage();

            if self.cancel.is_cancelled() {
                return Some(JobFailure::at(stage, StageFailure::cancelled()));
            }

            match self.checkpointed_artifact(&job.url, stage).await {
                Ok(Some(locator)) => {
                    debug!("{} already complete for {}", stage, job.url);
                    if !result.skipped.contains(&stage) && !result.stages.contains_key(&stage) {
                        result.skipped.push(stage);
                    }
                    self.complete_existing(runner.as_ref(), job, &locator).await;
                    result.stages.insert(stage, locator.clone());
                    input = Some(locator);
                    continue;
                }
                Ok(None) => {}
                Err(e) => return Some(JobFailure::at(stage, StageFailure::from_error("checkpoint", &e))),
            }

            let (locator, title) = match runner.existing(job).await {
                Some(locator) => {
                    info!("Found existing {} output for {}: {}", stage, job.url, locator);
                    result.skipped.push(stage);
                    self.complete_existing(runner.as_ref(), job, &locator).await;
                    (locator, None)
                }
                None => {
                    let run = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            warn!("Abandoning {} for {}", stage, job.url);
                            if let Err(e) = self.checkpoints.mark_stage_failed(&job.url, stage, "cancelled").await {
                                warn!("Could not record cancellation for {}: {}", job.url, e);
                            }
                            return Some(JobFailure::at(stage, StageFailure::cancelled()));
                        }
                        run = runner.run(job, input.as_ref(), &self.executor) => run,
                    };

                    result.attempts.extend(run.attempts);
                    match run.outcome {
                        StageOutcome::Completed(output) => (output.locator, output.title),
                        StageOutcome::Failed(failure) => {
                            let summary = failure.to_string();
                            if let Err(e) = self.checkpoints.mark_stage_failed(&job.url, stage, &summary).await {
                                warn!("Could not record failure for {}: {}", job.url, e);
                            }
                            return Some(JobFailure::at(stage, failure));
                        }
                    }
                }
            };

            if let Some(title) = title {
                if let Err(e) = self.checkpoints.record_title(&job.url, &title).await {
                    warn!("Could not record title for {}: {}", job.url, e);
                }
                result.title = Some(title);
            }

            if let Err(e) = self.checkpoints.mark_stage_complete(&job.url, stage, &locator).await {
                return Some(JobFailure::at(stage, StageFailure::from_error("checkpoint", &e)));
            }

            result.stages.insert(stage, locator.clone());
            input = Some(locator);
        }

        None
    }

    /// Artifact of a checkpointed stage, if the stage is complete and the
    /// artifact still exists.
    async fn checkpointed_artifact(&self, url: &str, stage: Stage) -> Result<Option<Locator>> {
        if !self.checkpoints.get_status(url).await?.contains(&stage) {
            return Ok(None);
        }

        match self.checkpoints.resolve_artifact(url, stage).await? {
            Some(locator) if self.artifacts.exists(&locator).await => Ok(Some(locator)),
            Some(locator) => {
                warn!(
                    "Checkpoint marks {} complete for {} but {} is missing; re-running",
                    stage, url, locator
                );
                Ok(None)
            }
            None => {
                warn!("Checkpoint marks {} complete for {} without an artifact; re-running", stage, url);
                Ok(None)
            }
        }
    }
}
