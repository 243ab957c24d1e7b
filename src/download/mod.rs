//! Download stage: fetch media for a URL into the artifact store.
//!
//! Backends are tried in the configured order. Each attempt downloads into
//! a fresh staging directory of its own; only a finished file is moved to its
//! canonical `downloads/{key}.{ext}` locator.

mod direct;
mod ytdlp;

pub use direct::DirectDownloader;
pub use ytdlp::YtDlpDownloader;

use crate::artifact::{ArtifactStore, Locator};
use crate::config::{DownloadBackend, DownloadSettings};
use crate::error::Result;
use crate::job::{Job, Stage};
use crate::stage::{StageExecutor, StageFailure, StageOutcome, StageOutput, StageRun, StageRunner, Strategy};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// A file produced by a download backend.
#[derive(Debug, Clone)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub title: Option<String>,
}

/// A backend that fetches media for a URL.
#[async_trait]
pub trait DownloadStrategy: Strategy {
    /// Download `url` into `dest_dir`, naming the file after `key`.
    async fn fetch(&self, url: &str, dest_dir: &Path, key: &str) -> Result<DownloadedMedia>;
}

/// Build the configured download backends in priority order.
pub fn build_download_strategies(
    settings: &DownloadSettings,
) -> Result<Vec<Arc<dyn DownloadStrategy>>> {
    let timeout = Duration::from_secs(settings.timeout_seconds);

    settings
        .backends()?
        .into_iter()
        .map(|backend| {
            let strategy: Arc<dyn DownloadStrategy> = match backend {
                DownloadBackend::YtDlp => Arc::new(YtDlpDownloader::yt_dlp(timeout)),
                DownloadBackend::YoutubeDl => Arc::new(YtDlpDownloader::youtube_dl(timeout)),
                DownloadBackend::Direct => Arc::new(DirectDownloader::new(timeout)?),
            };
            Ok(strategy)
        })
        .collect()
}

/// The download stage.
pub struct DownloadStage {
    strategies: Vec<Arc<dyn DownloadStrategy>>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl DownloadStage {
    pub fn new(strategies: Vec<Arc<dyn DownloadStrategy>>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            strategies,
            artifacts,
        }
    }
}

#[async_trait]
impl StageRunner for DownloadStage {
    fn stage(&self) -> Stage {
        Stage::Download
    }

    async fn existing(&self, job: &Job) -> Option<Locator> {
        self.artifacts.find_download(&job.key).await
    }

    #[instrument(skip_all, fields(url = %job.url))]
    async fn run(
        &self,
        job: &Job,
        _input: Option<&Locator>,
        executor: &StageExecutor,
    ) -> StageRun<StageOutput> {
        let run = executor
            .execute(Stage::Download, &self.strategies, |strategy| async move {
                let staging = self.artifacts.staging_dir(&job.key)?;
                let media = strategy.fetch(&job.url, staging.path(), &job.key).await?;
                Ok((media, staging))
            })
            .await;

        let (media, staging) = match run.outcome {
            StageOutcome::Completed(done) => done,
            StageOutcome::Failed(failure) => return StageRun::failed(failure, run.attempts),
        };

        let ext = media
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| "mp3".to_string());
        let locator = Locator::download(&job.key, &ext);

        let imported = self.artifacts.import_file(&media.path, &locator).await;
        drop(staging);

        match imported {
            Ok(()) => {
                debug!("Stored download as {}", locator);
                StageRun::completed(
                    StageOutput {
                        locator,
                        title: media.title,
                    },
                    run.attempts,
                )
            }
            Err(e) => StageRun::failed(StageFailure::from_error("artifact-store", &e), run.attempts),
        }
    }
}
