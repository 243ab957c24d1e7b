//! Audio processing with ffmpeg and ffprobe.
//!
//! Provides the [`Segmenter`] used to split media that is too large for a
//! transcription backend into fixed-length pieces.

use crate::error::{Result, VidpipeError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Map a failure to launch an external tool onto a crate error.
pub(crate) fn spawn_error(tool: &str, e: std::io::Error) -> VidpipeError {
    if e.kind() == std::io::ErrorKind::NotFound {
        VidpipeError::ToolNotFound(tool.to_string())
    } else {
        VidpipeError::ToolFailed(format!("{} execution failed: {}", tool, e))
    }
}

/// Splits a media file into consecutive fixed-length segments.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Write segments of `segment_seconds` into `output_dir`, returned in
    /// playback order.
    async fn split(
        &self,
        source: &Path,
        output_dir: &Path,
        segment_seconds: u32,
    ) -> Result<Vec<PathBuf>>;
}

/// Segmenter backed by ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegSegmenter;

#[async_trait]
impl Segmenter for FfmpegSegmenter {
    #[instrument(skip_all, fields(source = %source.display()))]
    async fn split(
        &self,
        source: &Path,
        output_dir: &Path,
        segment_seconds: u32,
    ) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(output_dir).await?;

        let total_duration = probe_duration(source).await?;
        info!("Total audio duration: {:.1}s", total_duration);

        let segment_len = f64::from(segment_seconds.max(1));
        if total_duration <= segment_len {
            return Ok(vec![source.to_path_buf()]);
        }

        let mut segments = Vec::new();
        let mut offset = 0.0;
        let mut idx = 0u32;

        while offset < total_duration {
            let path = output_dir.join(format!("segment_{:04}.mp3", idx));
            let length = segment_len.min(total_duration - offset);

            extract_segment(source, &path, offset, length).await?;
            debug!("Created segment {} at offset {:.1}s", idx, offset);
            segments.push(path);

            offset += segment_len;
            idx += 1;
        }

        info!("Created {} audio segments", segments.len());
        Ok(segments)
    }
}

/// Extracts a time range as MP3.
async fn extract_segment(source: &Path, dest: &Path, start: f64, length: f64) -> Result<()> {
    // Stream copy only works when the container is already MP3.
    let is_mp3 = source
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"));

    if is_mp3 {
        let copy = Command::new("ffmpeg")
            .arg("-ss").arg(format!("{:.3}", start))
            .arg("-i").arg(source)
            .arg("-t").arg(format!("{:.3}", length))
            .arg("-c").arg("copy")
            .arg("-y")
            .arg("-loglevel").arg("warning")
            .arg(dest)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if let Ok(status) = copy {
            if status.success() && dest.exists() {
                return Ok(());
            }
        }
        warn!("Stream copy failed, re-encoding segment");
    }

    let output = Command::new("ffmpeg")
        .arg("-ss").arg(format!("{:.3}", start))
        .arg("-i").arg(source)
        .arg("-t").arg(format!("{:.3}", length))
        .arg("-vn")
        .arg("-codec:a").arg("libmp3lame")
        .arg("-qscale:a").arg("2")
        .arg("-y")
        .arg("-loglevel").arg("error")
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| spawn_error("ffmpeg", e))?;

    if output.status.success() {
        Ok(())
    } else {
        let err = String::from_utf8_lossy(&output.stderr);
        Err(VidpipeError::ToolFailed(format!("Segment extraction failed: {}", err.trim())))
    }
}

/// Queries the duration of a media file with ffprobe.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .arg("-v").arg("quiet")
        .arg("-print_format").arg("json")
        .arg("-show_format")
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| spawn_error("ffprobe", e))?;

    if !output.status.success() {
        return Err(VidpipeError::ToolFailed(format!(
            "ffprobe could not read {}",
            path.display()
        )));
    }

    parse_probe_duration(&output.stdout)
}

fn parse_probe_duration(stdout: &[u8]) -> Result<f64> {
    let parsed: serde_json::Value = serde_json::from_slice(stdout)?;
    parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| VidpipeError::ToolFailed("Could not determine audio duration".into()))
}
