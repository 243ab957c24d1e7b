//! Transcription stage.
//!
//! Backends:
//!
//! - **openai**: the Whisper API. Rejects files above the configured size limit.
//! - **local**: the `whisper` command line tool, no size limit.
//!
//! When every backend fails and at least one of them refused the file for
//! being too large, the audio is split into fixed-length segments that are
//! transcribed concurrently and joined back in playback order.

mod local;
mod whisper_api;

pub use local::LocalWhisperTranscriber;
pub use whisper_api::WhisperApiTranscriber;

use crate::artifact::{ArtifactStore, Locator};
use crate::audio::Segmenter;
use crate::config::{TranscriptionBackend, TranscriptionSettings};
use crate::error::{Result, VidpipeError};
use crate::job::{Job, Stage};
use crate::stage::{
    FailureKind, StageAttempt, StageExecutor, StageFailure, StageOutcome, StageOutput, StageRun,
    StageRunner, Strategy,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A backend that turns audio into text.
#[async_trait]
pub trait TranscriptionStrategy: Strategy {
    /// Transcribe an audio file to plain text.
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;

    /// Largest input this backend accepts.
    fn max_input_size_bytes(&self) -> Option<u64> {
        None
    }
}

/// Build the configured transcription backends in priority order.
pub fn build_transcription_strategies(
    settings: &TranscriptionSettings,
) -> Result<Vec<Arc<dyn TranscriptionStrategy>>> {
    settings
        .backends()?
        .into_iter()
        .map(|backend| {
            let strategy: Arc<dyn TranscriptionStrategy> = match backend {
                TranscriptionBackend::OpenAI => Arc::new(WhisperApiTranscriber::new(
                    &settings.model,
                    settings.language.clone(),
                    settings.transcription_size_limit_bytes,
                )?),
                TranscriptionBackend::Local => Arc::new(LocalWhisperTranscriber::new(
                    &settings.local_model,
                    settings.language.clone(),
                )),
            };
            Ok(strategy)
        })
        .collect()
}

/// One attempt, enforcing the backend's size limit first.
async fn transcribe_checked(strategy: &dyn TranscriptionStrategy, audio_path: &Path) -> Result<String> {
    let metadata = match tokio::fs::metadata(audio_path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VidpipeError::InputMissing(format!(
                "Audio file not found: {}",
                audio_path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(limit) = strategy.max_input_size_bytes() {
        if metadata.len() > limit {
            return Err(VidpipeError::OutputTooLarge {
                size: metadata.len(),
                limit,
            });
        }
    }

    strategy.transcribe(audio_path).await
}

/// Segment splitting configuration.
struct Splitting {
    segmenter: Arc<dyn Segmenter>,
    segment_seconds: u32,
    workers: usize,
}

/// The transcription stage.
pub struct TranscriptionStage {
    strategies: Vec<Arc<dyn TranscriptionStrategy>>,
    artifacts: Arc<dyn ArtifactStore>,
    splitting: Option<Splitting>,
}

impl TranscriptionStage {
    pub fn new(
        strategies: Vec<Arc<dyn TranscriptionStrategy>>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            strategies,
            artifacts,
            splitting: None,
        }
    }

    /// Enable splitting of inputs that no backend accepts whole.
    pub fn with_segmenter(
        mut self,
        segmenter: Arc<dyn Segmenter>,
        segment_seconds: u32,
        workers: usize,
    ) -> Self {
        self.splitting = Some(Splitting {
            segmenter,
            segment_seconds,
            workers: workers.max(1),
        });
        self
    }

    /// Transcribe `audio` piecewise. Any failed segment fails the whole stage.
    #[instrument(skip_all, fields(audio = %audio.display()))]
    async fn transcribe_segments(
        &self,
        splitting: &Splitting,
        audio: &Path,
        executor: &StageExecutor,
        mut attempts: Vec<StageAttempt>,
    ) -> StageRun<String> {
        let temp_dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                let failure = StageFailure::from_error("segmenter", &VidpipeError::from(e));
                return StageRun::failed(failure, attempts);
            }
        };

        let segments: Vec<PathBuf> = match splitting
            .segmenter
            .split(audio, temp_dir.path(), splitting.segment_seconds)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!("Could not split audio: {}", e);
                return StageRun::failed(StageFailure::from_error("segmenter", &e), attempts);
            }
        };

        let count = segments.len();
        info!("Transcribing {} segments with {} workers", count, splitting.workers);

        let strategies = &self.strategies;
        let mut stream = stream::iter(segments.into_iter().enumerate())
            .map(move |(idx, path): (usize, PathBuf)| async move {
                let path = &path;
                let run = executor
                    .execute(Stage::Transcription, strategies, |strategy| async move {
                        transcribe_checked(strategy.as_ref(), path).await
                    })
                    .await;
                (idx, run)
            })
            .buffer_unordered(splitting.workers);

        let mut texts: Vec<(usize, String)> = Vec::with_capacity(count);
        while let Some((idx, run)) = stream.next().await {
            attempts.extend(run.attempts);
            match run.outcome {
                StageOutcome::Completed(text) => texts.push((idx, text)),
                StageOutcome::Failed(mut failure) => {
                    for err in &mut failure.errors {
                        err.message = format!("segment {}/{}: {}", idx + 1, count, err.message);
                    }
                    return StageRun::failed(failure, attempts);
                }
            }
        }

        texts.sort_by_key(|(idx, _)| *idx);
        let joined = texts
            .into_iter()
            .map(|(_, text)| text.trim().to_string())
            .collect::<Vec<_>>()
            .join("\n");

        StageRun::completed(joined, attempts)
    }
}

#[async_trait]
impl StageRunner for TranscriptionStage {
    fn stage(&self) -> Stage {
        Stage::Transcription
    }

    async fn existing(&self, job: &Job) -> Option<Locator> {
        let locator = Locator::transcription(&job.key);
        self.artifacts.exists(&locator).await.then_some(locator)
    }

    #[instrument(skip_all, fields(url = %job.url))]
    async fn run(
        &self,
        job: &Job,
        input: Option<&Locator>,
        executor: &StageExecutor,
    ) -> StageRun<StageOutput> {
        let Some(input) = input else {
            return StageRun::failed(
                StageFailure::from_error(
                    "transcription",
                    &VidpipeError::InputMissing("no downloaded audio".into()),
                ),
                Vec::new(),
            );
        };

        let audio = self.artifacts.path(input);
        let audio_ref = &audio;

        let run = executor
            .execute(Stage::Transcription, &self.strategies, |strategy| async move {
                transcribe_checked(strategy.as_ref(), audio_ref).await
            })
            .await;

        let run = match (run.outcome, &self.splitting) {
            (StageOutcome::Failed(failure), Some(splitting))
                if failure.kind == FailureKind::AllStrategiesExhausted && failure.input_too_large() =>
            {
                info!("No backend accepts the whole file, splitting into segments");
                self.transcribe_segments(splitting, &audio, executor, run.attempts)
                    .await
            }
            (outcome, _) => StageRun {
                outcome,
                attempts: run.attempts,
            },
        };

        let text = match run.outcome {
            StageOutcome::Completed(text) => text,
            StageOutcome::Failed(failure) => return StageRun::failed(failure, run.attempts),
        };

        let locator = Locator::transcription(&job.key);
        match self.artifacts.write_text(&locator, &text).await {
            Ok(()) => StageRun::completed(StageOutput::new(locator), run.attempts),
            Err(e) => StageRun::failed(StageFailure::from_error("artifact-store", &e), run.attempts),
        }
    }
}
