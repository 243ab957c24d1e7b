//! Fake backends and pipeline wiring shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vidpipe::artifact::{ArtifactStore, FsArtifactStore};
use vidpipe::audio::Segmenter;
use vidpipe::checkpoint::CheckpointStore;
use vidpipe::download::{DownloadStage, DownloadStrategy, DownloadedMedia};
use vidpipe::error::{Result, VidpipeError};
use vidpipe::orchestrator::Orchestrator;
use vidpipe::retry::RetryPolicy;
use vidpipe::stage::{StageExecutor, StageRunner, Strategy};
use vidpipe::summarization::{SummarizationStrategy, SummaryStage};
use vidpipe::transcription::{TranscriptionStage, TranscriptionStrategy};

/// Shared record of which stage ran, in call order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// How a fake backend behaves.
#[derive(Clone, Copy, Debug)]
pub enum Behaviour {
    Succeed,
    /// Fail with a retryable error on every call.
    AlwaysFail,
    /// Fail with a retryable error for the first `n` calls.
    FailFirst(usize),
    /// Credentials rejected.
    Unauthorized,
    /// Never returns.
    Hang,
}

impl Behaviour {
    async fn apply(self, calls: usize, what: &str) -> Result<()> {
        match self {
            Behaviour::Succeed => Ok(()),
            Behaviour::AlwaysFail => Err(VidpipeError::ToolFailed(format!("{} crashed", what))),
            Behaviour::FailFirst(n) if calls <= n => {
                Err(VidpipeError::ToolFailed(format!("{} flaked", what)))
            }
            Behaviour::FailFirst(_) => Ok(()),
            Behaviour::Unauthorized => Err(VidpipeError::Authentication("bad key".into())),
            Behaviour::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

/// Writes the URL (or a fixed body) as the "audio" file.
pub struct FakeDownloader {
    pub id: String,
    pub behaviour: Behaviour,
    /// URLs containing this marker always fail.
    pub broken_marker: Option<String>,
    pub body: Option<String>,
    /// Time spent "downloading" after the staging file is created.
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub log: CallLog,
}

impl FakeDownloader {
    pub fn new(id: &str, behaviour: Behaviour, log: CallLog) -> Self {
        Self {
            id: id.to_string(),
            behaviour,
            broken_marker: None,
            body: None,
            delay: None,
            calls: AtomicUsize::new(0),
            log,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Strategy for FakeDownloader {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl DownloadStrategy for FakeDownloader {
    async fn fetch(&self, url: &str, dest_dir: &Path, key: &str) -> Result<DownloadedMedia> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push(format!("download:{}", url));
        self.behaviour.apply(calls, &self.id).await?;
        if let Some(marker) = &self.broken_marker {
            if url.contains(marker.as_str()) {
                return Err(VidpipeError::Download(format!("{} is gone", url)));
            }
        }

        let path = dest_dir.join(format!("{}.mp3", key));
        let body = self.body.clone().unwrap_or_else(|| format!("audio of {}", url));
        tokio::fs::write(&path, body).await?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(DownloadedMedia {
            path,
            title: Some(format!("Title {}", key)),
        })
    }
}

/// Returns the audio file contents as the transcript.
pub struct FakeTranscriber {
    pub id: String,
    pub behaviour: Behaviour,
    pub limit: Option<u64>,
    pub calls: AtomicUsize,
    pub log: CallLog,
}

impl FakeTranscriber {
    pub fn new(id: &str, behaviour: Behaviour, log: CallLog) -> Self {
        Self {
            id: id.to_string(),
            behaviour,
            limit: None,
            calls: AtomicUsize::new(0),
            log,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Strategy for FakeTranscriber {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl TranscriptionStrategy for FakeTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push("transcription".to_string());
        self.behaviour.apply(calls, &self.id).await?;
        Ok(tokio::fs::read_to_string(audio_path).await?)
    }

    fn max_input_size_bytes(&self) -> Option<u64> {
        self.limit
    }
}

/// Prefixes the transcript with "summary: ".
pub struct FakeSummarizer {
    pub id: String,
    pub behaviour: Behaviour,
    /// Flip to make a failing summarizer start succeeding.
    pub healed: AtomicBool,
    /// Whether `translate` works; it fails while this is false.
    pub translates: AtomicBool,
    pub calls: AtomicUsize,
    pub log: CallLog,
}

impl FakeSummarizer {
    pub fn new(id: &str, behaviour: Behaviour, log: CallLog) -> Self {
        Self {
            id: id.to_string(),
            behaviour,
            healed: AtomicBool::new(false),
            translates: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            log,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Strategy for FakeSummarizer {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl SummarizationStrategy for FakeSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.lock().unwrap().push("summary".to_string());
        if !self.healed.load(Ordering::SeqCst) {
            self.behaviour.apply(calls, &self.id).await?;
        }
        Ok(format!("summary: {}", text))
    }

    async fn translate(&self, text: &str, language: &str) -> Result<String> {
        self.log.lock().unwrap().push(format!("translate:{}", language));
        if self.translates.load(Ordering::SeqCst) {
            Ok(format!("[{}] {}", language, text))
        } else {
            Err(VidpipeError::Summarization("translator offline".into()))
        }
    }
}

/// Splits on lines: segment N holds line N of the source.
pub struct LineSegmenter;

#[async_trait]
impl Segmenter for LineSegmenter {
    async fn split(&self, source: &Path, output_dir: &Path, _seconds: u32) -> Result<Vec<PathBuf>> {
        let content = tokio::fs::read_to_string(source).await?;
        let mut paths = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let path = output_dir.join(format!("segment_{:04}.mp3", i));
            tokio::fs::write(&path, line).await?;
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Backends for one pipeline.
pub struct Backends {
    pub downloaders: Vec<Arc<FakeDownloader>>,
    pub transcribers: Vec<Arc<FakeTranscriber>>,
    pub summarizers: Vec<Arc<FakeSummarizer>>,
    pub segmenter: bool,
    pub translate_to: Vec<String>,
}

impl Backends {
    /// One succeeding backend per stage.
    pub fn healthy(log: &CallLog) -> Self {
        Self {
            downloaders: vec![Arc::new(FakeDownloader::new("dl", Behaviour::Succeed, log.clone()))],
            transcribers: vec![Arc::new(FakeTranscriber::new("tx", Behaviour::Succeed, log.clone()))],
            summarizers: vec![Arc::new(FakeSummarizer::new("sum", Behaviour::Succeed, log.clone()))],
            segmenter: false,
            translate_to: Vec::new(),
        }
    }
}

/// Wire the fakes into an orchestrator over `root`.
pub fn orchestrator(
    root: &Path,
    backends: &Backends,
    checkpoints: Arc<dyn CheckpointStore>,
    max_retries: u32,
) -> Orchestrator {
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(root).unwrap());

    let downloaders: Vec<Arc<dyn DownloadStrategy>> = backends
        .downloaders
        .iter()
        .map(|d| d.clone() as Arc<dyn DownloadStrategy>)
        .collect();
    let transcribers: Vec<Arc<dyn TranscriptionStrategy>> = backends
        .transcribers
        .iter()
        .map(|t| t.clone() as Arc<dyn TranscriptionStrategy>)
        .collect();
    let summarizers: Vec<Arc<dyn SummarizationStrategy>> = backends
        .summarizers
        .iter()
        .map(|s| s.clone() as Arc<dyn SummarizationStrategy>)
        .collect();

    let mut transcription = TranscriptionStage::new(transcribers, artifacts.clone());
    if backends.segmenter {
        transcription = transcription.with_segmenter(Arc::new(LineSegmenter), 300, 3);
    }

    let runners: Vec<Arc<dyn StageRunner>> = vec![
        Arc::new(SummaryStage::new(summarizers, artifacts.clone()).with_translations(backends.translate_to.clone())),
        Arc::new(DownloadStage::new(downloaders, artifacts.clone())),
        Arc::new(transcription),
    ];

    let executor = StageExecutor::new(RetryPolicy::new(max_retries, Duration::from_secs(1)));
    Orchestrator::new(checkpoints, artifacts, runners, executor)
}
