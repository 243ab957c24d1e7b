//! yt-dlp and youtube-dl backends.

use super::{DownloadStrategy, DownloadedMedia};
use crate::artifact::AUDIO_EXTENSIONS;
use crate::audio::spawn_error;
use crate::error::{Result, VidpipeError};
use crate::stage::Strategy;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, instrument};

/// Downloads audio by shelling out to yt-dlp or its youtube-dl ancestor.
///
/// Both tools share the audio extraction flags; only yt-dlp can report the
/// title of the file it just wrote.
pub struct YtDlpDownloader {
    binary: &'static str,
    print_title: bool,
    timeout: Duration,
}

impl YtDlpDownloader {
    pub fn yt_dlp(timeout: Duration) -> Self {
        Self {
            binary: "yt-dlp",
            print_title: true,
            timeout,
        }
    }

    pub fn youtube_dl(timeout: Duration) -> Self {
        Self {
            binary: "youtube-dl",
            print_title: false,
            timeout,
        }
    }

    fn command(&self, url: &str, template: &Path) -> Command {
        let mut cmd = Command::new(self.binary);
        cmd.arg("--extract-audio")
            .arg("--audio-format").arg("mp3")
            .arg("--audio-quality").arg("0")
            .arg("--output").arg(template)
            .arg("--no-playlist")
            .arg("--no-warnings");

        if self.print_title {
            cmd.arg("--print").arg("after_move:title");
        } else {
            cmd.arg("--quiet");
        }

        cmd.arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Strategy for YtDlpDownloader {
    fn id(&self) -> &str {
        self.binary
    }
}

#[async_trait]
impl DownloadStrategy for YtDlpDownloader {
    #[instrument(skip(self, dest_dir), fields(tool = self.binary))]
    async fn fetch(&self, url: &str, dest_dir: &Path, key: &str) -> Result<DownloadedMedia> {
        info!("Downloading audio from {}", url);

        let template = dest_dir.join(format!("{}.%(ext)s", key));
        let output = tokio::time::timeout(self.timeout, self.command(url, &template).output())
            .await
            .map_err(|_| {
                VidpipeError::Download(format!(
                    "{} timed out after {}s",
                    self.binary,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| spawn_error(self.binary, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(self.binary, &stderr));
        }

        let path = find_audio_file(dest_dir, key)?;
        let title = if self.print_title {
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::trim)
                .rfind(|l| !l.is_empty())
                .map(str::to_string)
        } else {
            None
        };

        Ok(DownloadedMedia { path, title })
    }
}

/// Turn tool stderr into an error the retry policy can act on.
fn classify_failure(tool: &str, stderr: &str) -> VidpipeError {
    let msg = format!("{} failed: {}", tool, stderr.trim());
    let lower = stderr.to_lowercase();

    if lower.contains("http error 429") || lower.contains("too many requests") {
        VidpipeError::RateLimited(msg)
    } else if lower.contains("unsupported url") {
        VidpipeError::StrategyUnavailable(msg)
    } else if lower.contains("sign in to confirm") || lower.contains("http error 403") {
        VidpipeError::Authentication(msg)
    } else {
        VidpipeError::Download(msg)
    }
}

/// Locates the file the tool produced for `key`.
fn find_audio_file(dir: &Path, key: &str) -> Result<PathBuf> {
    for ext in AUDIO_EXTENSIONS {
        let candidate = dir.join(format!("{}.{}", key, ext));
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    // Fallback: any finished file carrying the key
    let entries = std::fs::read_dir(dir)?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(key) && !name.ends_with(".part") {
            return Ok(entry.path());
        }
    }

    Err(VidpipeError::Download("Audio file not found after download".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure("yt-dlp", "ERROR: HTTP Error 429: Too Many Requests").class(),
            ErrorClass::RateLimited
        );
        assert_eq!(
            classify_failure("yt-dlp", "ERROR: Unsupported URL: https://example.com").class(),
            ErrorClass::Unavailable
        );
        assert_eq!(
            classify_failure("yt-dlp", "ERROR: Sign in to confirm you're not a bot").class(),
            ErrorClass::Authentication
        );
        assert_eq!(
            classify_failure("youtube-dl", "ERROR: unable to download webpage").class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_find_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.webm.part"), b"").unwrap();
        assert!(find_audio_file(dir.path(), "abc").is_err());

        std::fs::write(dir.path().join("abc.mp3"), b"audio").unwrap();
        assert_eq!(find_audio_file(dir.path(), "abc").unwrap(), dir.path().join("abc.mp3"));
    }

    #[test]
    fn test_ids() {
        let timeout = Duration::from_secs(1);
        assert_eq!(YtDlpDownloader::yt_dlp(timeout).id(), "yt-dlp");
        assert_eq!(YtDlpDownloader::youtube_dl(timeout).id(), "youtube-dl");
    }
}
