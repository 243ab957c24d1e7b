//! Artifact storage for stage outputs.
//!
//! Artifacts live under a single output root:
//!
//! ```text
//! downloads/{key}.{ext}
//! transcriptions/{key}.txt
//! summaries/{key}_summary.txt
//! summaries/{key}_summary_{lang}.txt
//! ```
//!
//! Every write is atomic: content lands in a temporary file in the target
//! directory and is renamed into place, so a crash never leaves a partial
//! artifact at a final locator.

use crate::error::{Result, VidpipeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Extensions probed when looking for an existing download.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus", "webm", "ogg", "wav"];

/// Opaque reference to a stored artifact, relative to the store root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Downloaded media for `key`.
    pub fn download(key: &str, ext: &str) -> Self {
        Self(format!("downloads/{}.{}", key, ext))
    }

    /// Transcript for `key`.
    pub fn transcription(key: &str) -> Self {
        Self(format!("transcriptions/{}.txt", key))
    }

    /// Summary for `key`.
    pub fn summary(key: &str) -> Self {
        Self(format!("summaries/{}_summary.txt", key))
    }

    /// Summary translated into `language`.
    pub fn translation(key: &str, language: &str) -> Self {
        Self(format!("summaries/{}_summary_{}.txt", key, language))
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for stage outputs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Filesystem path backing a locator.
    fn path(&self, locator: &Locator) -> PathBuf;

    /// Fresh scratch directory for one attempt on `key`, removed on drop.
    fn staging_dir(&self, key: &str) -> Result<TempDir>;

    /// Whether the artifact exists.
    async fn exists(&self, locator: &Locator) -> bool;

    /// Atomically write text to a locator.
    async fn write_text(&self, locator: &Locator, content: &str) -> Result<()>;

    /// Read a text artifact. A missing artifact is `InputMissing`.
    async fn read_text(&self, locator: &Locator) -> Result<String>;

    /// Move a finished file into the store under `locator`.
    async fn import_file(&self, source: &Path, locator: &Locator) -> Result<()>;

    /// Locate an existing download for `key` under any known audio extension.
    async fn find_download(&self, key: &str) -> Option<Locator>;
}

/// Artifact store rooted at a directory on the local filesystem.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create the store, creating the layout directories if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["downloads", "transcriptions", "summaries", ".staging"] {
            std::fs::create_dir_all(root.join(dir))?;
        }
        debug!("Artifact store at {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| VidpipeError::Artifact(format!("No parent directory: {:?}", path)))?;
        std::fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| VidpipeError::Artifact(format!("Failed to persist {:?}: {}", path, e)))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn path(&self, locator: &Locator) -> PathBuf {
        self.root.join(locator.as_str())
    }

    fn staging_dir(&self, key: &str) -> Result<TempDir> {
        let parent = self.root.join(".staging");
        std::fs::create_dir_all(&parent)?;
        Ok(tempfile::Builder::new()
            .prefix(&format!("{}-", key))
            .tempdir_in(parent)?)
    }

    async fn exists(&self, locator: &Locator) -> bool {
        self.path(locator).is_file()
    }

    async fn write_text(&self, locator: &Locator, content: &str) -> Result<()> {
        let path = self.path(locator);
        Self::write_atomic(&path, content.as_bytes())?;
        debug!("Wrote artifact {}", locator);
        Ok(())
    }

    async fn read_text(&self, locator: &Locator) -> Result<String> {
        let path = self.path(locator);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(VidpipeError::InputMissing(
                format!("Artifact not found: {}", locator),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn import_file(&self, source: &Path, locator: &Locator) -> Result<()> {
        if !source.is_file() {
            return Err(VidpipeError::InputMissing(format!(
                "File to import not found: {:?}",
                source
            )));
        }

        let target = self.path(locator);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Rename fails across filesystems; fall back to copy then atomic persist.
        if tokio::fs::rename(source, &target).await.is_err() {
            let content = tokio::fs::read(source).await?;
            Self::write_atomic(&target, &content)?;
            let _ = tokio::fs::remove_file(source).await;
        }

        debug!("Imported {:?} as {}", source, locator);
        Ok(())
    }

    async fn find_download(&self, key: &str) -> Option<Locator> {
        for ext in AUDIO_EXTENSIONS {
            let locator = Locator::download(key, ext);
            if self.exists(&locator).await {
                return Some(locator);
            }
        }
        None
    }
}
