//! Direct HTTP download of media files.

use super::{DownloadStrategy, DownloadedMedia};
use crate::artifact::AUDIO_EXTENSIONS;
use crate::error::{Result, VidpipeError};
use crate::stage::Strategy;
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use url::Url;

/// Fetches URLs that point straight at an audio file.
pub struct DirectDownloader {
    client: Client,
}

impl DirectDownloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Lowercased media extension of the URL path, if it is one we store.
    fn media_extension(url: &Url) -> Option<String> {
        let filename = url.path_segments()?.last()?;
        let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        AUDIO_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
    }

    fn title_from_url(url: &Url) -> Option<String> {
        let filename = url.path_segments()?.last()?;
        let stem = Path::new(filename).file_stem()?.to_str()?;
        let title = stem.replace(['_', '-'], " ").trim().to_string();
        (!title.is_empty()).then_some(title)
    }
}

impl Strategy for DirectDownloader {
    fn id(&self) -> &str {
        "direct"
    }
}

#[async_trait]
impl DownloadStrategy for DirectDownloader {
    #[instrument(skip(self, dest_dir))]
    async fn fetch(&self, url: &str, dest_dir: &Path, key: &str) -> Result<DownloadedMedia> {
        let parsed = Url::parse(url)
            .map_err(|e| VidpipeError::InvalidInput(format!("Invalid URL {}: {}", url, e)))?;

        let ext = Self::media_extension(&parsed).ok_or_else(|| {
            VidpipeError::StrategyUnavailable(format!("{} is not a direct media link", url))
        })?;

        let mut response = self.client.get(parsed.clone()).send().await?.error_for_status()?;

        let path = dest_dir.join(format!("{}.{}", key, ext));
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(VidpipeError::Download(format!("Empty response body from {}", url)));
        }

        debug!("Downloaded {} bytes to {:?}", written, path);

        Ok(DownloadedMedia {
            path,
            title: Self::title_from_url(&parsed),
        })
    }
}
