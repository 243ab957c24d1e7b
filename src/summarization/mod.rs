//! Summary stage: condense a transcript and optionally translate the result.

mod anthropic;
mod openai;

pub use anthropic::AnthropicSummarizer;
pub use openai::OpenAISummarizer;

use crate::artifact::{ArtifactStore, Locator};
use crate::config::{Prompts, SummarizationBackend, SummarizationSettings};
use crate::error::{Result, VidpipeError};
use crate::job::{Job, Stage};
use crate::stage::{StageExecutor, StageFailure, StageOutcome, StageOutput, StageRun, StageRunner, Strategy};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A backend that summarizes text.
#[async_trait]
pub trait SummarizationStrategy: Strategy {
    async fn summarize(&self, text: &str) -> Result<String>;

    /// Translate `text` into `language` (an ISO 639-1 code).
    async fn translate(&self, _text: &str, _language: &str) -> Result<String> {
        Err(VidpipeError::StrategyUnavailable(format!(
            "{} does not translate",
            self.id()
        )))
    }
}

/// Build the configured summarization backends in priority order.
pub fn build_summarization_strategies(
    settings: &SummarizationSettings,
    prompts: Arc<Prompts>,
) -> Result<Vec<Arc<dyn SummarizationStrategy>>> {
    settings
        .backends()?
        .into_iter()
        .map(|backend| {
            let strategy: Arc<dyn SummarizationStrategy> = match backend {
                SummarizationBackend::OpenAI => Arc::new(OpenAISummarizer::new(
                    &settings.openai_model,
                    settings.max_tokens,
                    prompts.clone(),
                )?),
                SummarizationBackend::Anthropic => Arc::new(AnthropicSummarizer::new(
                    &settings.anthropic_model,
                    settings.max_tokens,
                    prompts.clone(),
                )?),
            };
            Ok(strategy)
        })
        .collect()
}

/// The summary stage.
pub struct SummaryStage {
    strategies: Vec<Arc<dyn SummarizationStrategy>>,
    artifacts: Arc<dyn ArtifactStore>,
    translate_to: Vec<String>,
}

impl SummaryStage {
    pub fn new(
        strategies: Vec<Arc<dyn SummarizationStrategy>>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            strategies,
            artifacts,
            translate_to: Vec::new(),
        }
    }

    /// Also write the summary in each of `languages`.
    pub fn with_translations(mut self, languages: Vec<String>) -> Self {
        self.translate_to = languages;
        self
    }

    /// Write translations of `summary`. Failures are logged, never returned.
    async fn translate_all(&self, job: &Job, summary: &str, executor: &StageExecutor) {
        for language in &self.translate_to {
            let locator = Locator::translation(&job.key, language);
            if self.artifacts.exists(&locator).await {
                continue;
            }

            let language = language.as_str();
            let run = executor
                .execute(Stage::Summary, &self.strategies, |strategy| async move {
                    strategy.translate(summary, language).await
                })
                .await;

            match run.outcome {
                StageOutcome::Completed(text) => {
                    if let Err(e) = self.artifacts.write_text(&locator, &text).await {
                        warn!("Could not save {} translation: {}", language, e);
                    } else {
                        info!("Saved {} translation", language);
                    }
                }
                StageOutcome::Failed(failure) => {
                    warn!("Translation to {} failed: {}", language, failure);
                }
            }
        }
    }
}

#[async_trait]
impl StageRunner for SummaryStage {
    fn stage(&self) -> Stage {
        Stage::Summary
    }

    async fn existing(&self, job: &Job) -> Option<Locator> {
        let locator = Locator::summary(&job.key);
        self.artifacts.exists(&locator).await.then_some(locator)
    }

    #[instrument(skip_all, fields(url = %job.url))]
    async fn run(
        &self,
        job: &Job,
        input: Option<&Locator>,
        executor: &StageExecutor,
    ) -> StageRun<StageOutput> {
        let transcript = match input {
            Some(locator) => self.artifacts.read_text(locator).await,
            None => Err(VidpipeError::InputMissing("no transcript".into())),
        };
        let transcript = match transcript {
            Ok(t) if t.trim().is_empty() => Err(VidpipeError::InputMissing("transcript is empty".into())),
            other => other,
        };
        let transcript = match transcript {
            Ok(t) => t,
            Err(e) => return StageRun::failed(StageFailure::from_error("summary", &e), Vec::new()),
        };

        let text = transcript.as_str();
        let run = executor
            .execute(Stage::Summary, &self.strategies, |strategy| async move {
                strategy.summarize(text).await
            })
            .await;

        let summary = match run.outcome {
            StageOutcome::Completed(summary) => summary,
            StageOutcome::Failed(failure) => return StageRun::failed(failure, run.attempts),
        };

        let locator = Locator::summary(&job.key);
        if let Err(e) = self.artifacts.write_text(&locator, &summary).await {
            return StageRun::failed(StageFailure::from_error("artifact-store", &e), run.attempts);
        }

        self.translate_all(job, &summary, executor).await;

        StageRun::completed(StageOutput::new(locator), run.attempts)
    }

    async fn complete_existing(&self, job: &Job, output: &Locator, executor: &StageExecutor) {
        let mut missing = false;
        for language in &self.translate_to {
            if !self.artifacts.exists(&Locator::translation(&job.key, language)).await {
                missing = true;
                break;
            }
        }
        if !missing {
            return;
        }

        match self.artifacts.read_text(output).await {
            Ok(summary) => self.translate_all(job, &summary, executor).await,
            Err(e) => warn!("Cannot translate {}: {}", output, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::FsArtifactStore;
    use crate::stage::FailureKind;

    struct UpperSummarizer {
        translates: bool,
    }

    impl Strategy for UpperSummarizer {
        fn id(&self) -> &str {
            "upper"
        }
    }

    #[async_trait]
    impl SummarizationStrategy for UpperSummarizer {
        async fn summarize(&self, text: &str) -> Result<String> {
            Ok(text.to_uppercase())
        }

        async fn translate(&self, text: &str, language: &str) -> Result<String> {
            if self.translates {
                Ok(format!("[{}] {}", language, text))
            } else {
                Err(VidpipeError::Summarization("translation service down".into()))
            }
        }
    }

    struct SummaryOnly;

    impl Strategy for SummaryOnly {
        fn id(&self) -> &str {
            "summary-only"
        }
    }

    #[async_trait]
    impl SummarizationStrategy for SummaryOnly {
        async fn summarize(&self, text: &str) -> Result<String> {
            Ok(text.to_string())
        }
    }

    fn setup(transcript: &str) -> (tempfile::TempDir, Arc<dyn ArtifactStore>, Locator, Job) {
        let dir = tempfile::tempdir().unwrap();
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path()).unwrap());
        let job = Job::new("https://example.com/k.mp3", 0);
        let input = Locator::transcription(&job.key);
        std::fs::write(artifacts.path(&input), transcript).unwrap();
        (dir, artifacts, input, job)
    }

    #[tokio::test]
    async fn test_summary_with_translation_fallback() {
        let (_dir, artifacts, input, job) = setup("hello");
        let stage = SummaryStage::new(
            vec![Arc::new(SummaryOnly), Arc::new(UpperSummarizer { translates: true })],
            artifacts.clone(),
        )
        .with_translations(vec!["es".into()]);

        let run = stage.run(&job, Some(&input), &StageExecutor::default()).await;
        let StageOutcome::Completed(output) = run.outcome else {
            panic!("expected completion");
        };
        assert_eq!(artifacts.read_text(&output.locator).await.unwrap(), "hello");
        assert_eq!(
            artifacts
                .read_text(&Locator::translation(&job.key, "es"))
                .await
                .unwrap(),
            "[es] hello"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_translation_failure_is_not_fatal() {
        let (_dir, artifacts, input, job) = setup("hello");
        let stage = SummaryStage::new(vec![Arc::new(UpperSummarizer { translates: false })], artifacts.clone())
            .with_translations(vec!["en".into()]);

        let run = stage.run(&job, Some(&input), &StageExecutor::default()).await;
        assert!(matches!(run.outcome, StageOutcome::Completed(_)));
        assert!(!artifacts.exists(&Locator::translation(&job.key, "en")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_summary_gets_missing_translations() {
        let (_dir, artifacts, _input, job) = setup("hello");
        let summary = Locator::summary(&job.key);
        artifacts.write_text(&summary, "done before").await.unwrap();
        artifacts
            .write_text(&Locator::translation(&job.key, "es"), "hecho")
            .await
            .unwrap();

        let stage = SummaryStage::new(vec![Arc::new(UpperSummarizer { translates: true })], artifacts.clone())
            .with_translations(vec!["es".into(), "fr".into()]);
        stage.complete_existing(&job, &summary, &StageExecutor::default()).await;

        assert_eq!(
            artifacts.read_text(&Locator::translation(&job.key, "es")).await.unwrap(),
            "hecho"
        );
        assert_eq!(
            artifacts.read_text(&Locator::translation(&job.key, "fr")).await.unwrap(),
            "[fr] done before"
        );
    }

    #[tokio::test]
    async fn test_empty_transcript_is_input_missing() {
        let (_dir, artifacts, input, job) = setup("   \n");
        let stage = SummaryStage::new(vec![Arc::new(SummaryOnly)], artifacts);

        let run = stage.run(&job, Some(&input), &StageExecutor::default()).await;
        let StageOutcome::Failed(failure) = run.outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::InputMissing);
        assert!(run.attempts.is_empty());
    }
}
