//! Jobs, stages, and URL list ingestion.

use crate::error::{Result, VidpipeError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

/// One pipeline stage. Ordering follows execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Transcription,
    Summary,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Download, Stage::Transcription, Stage::Summary];

    /// Name used in checkpoints and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Transcription => "transcription",
            Stage::Summary => "summary",
        }
    }

    /// The stage that must be complete before this one may run.
    pub fn predecessor(self) -> Option<Stage> {
        match self {
            Stage::Download => None,
            Stage::Transcription => Some(Stage::Download),
            Stage::Summary => Some(Stage::Transcription),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = VidpipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "download" => Ok(Stage::Download),
            "transcription" => Ok(Stage::Transcription),
            "summary" => Ok(Stage::Summary),
            other => Err(VidpipeError::Checkpoint(format!("Unknown stage: {}", other))),
        }
    }
}

/// One input URL to be processed end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// The URL. Its key is unique within a batch.
    pub url: String,
    /// Index in the input batch (zero based).
    pub position: usize,
    /// Deterministic file-name key derived from the URL.
    pub key: String,
}

impl Job {
    /// Create a job for `url` at `position`.
    pub fn new(url: impl Into<String>, position: usize) -> Self {
        let url = url.into();
        let key = artifact_key(&url);
        Self { url, position, key }
    }
}

fn youtube_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?:https?://)?
            (?:www\.|m\.)?
            (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)
            ([a-zA-Z0-9_-]{11})
            ",
        )
        .expect("Invalid regex")
    })
}

/// Derive the artifact key for a URL.
///
/// YouTube video URLs use the video id, anything else a UUIDv5 of the URL.
pub fn artifact_key(url: &str) -> String {
    if let Some(caps) = youtube_id_regex().captures(url.trim()) {
        if let Some(id) = caps.get(1) {
            return id.as_str().to_string();
        }
    }
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, url.trim().as_bytes()).to_string()
}

/// A parsed batch: accepted jobs plus rejected input lines.
#[derive(Debug, Clone, Default)]
pub struct UrlBatch {
    pub jobs: Vec<Job>,
    pub invalid: Vec<String>,
    /// URLs dropped because an earlier line resolves to the same artifacts.
    pub duplicates: Vec<String>,
}

/// Parse a URL list: one URL per line, `#` comments and blank lines ignored.
///
/// URLs are deduplicated by artifact key, so two spellings of one video
/// become a single job at the first one's position. Lines that are not
/// absolute http(s) URLs are returned in `invalid`.
pub fn parse_url_list(content: &str) -> UrlBatch {
    let mut batch = UrlBatch::default();
    let mut seen = HashSet::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match Url::parse(line) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                let job = Job::new(line, batch.jobs.len());
                if seen.insert(job.key.clone()) {
                    batch.jobs.push(job);
                } else {
                    debug!("Dropping duplicate of {}: {}", job.key, line);
                    batch.duplicates.push(line.to_string());
                }
            }
            _ => {
                warn!("Rejecting invalid URL: {}", line);
                batch.invalid.push(line.to_string());
            }
        }
    }

    batch
}

/// Read and parse a URL list file.
pub fn read_url_list(path: &Path) -> Result<UrlBatch> {
    if !path.exists() {
        return Err(VidpipeError::InvalidInput(format!(
            "URL list not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(parse_url_list(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Download < Stage::Transcription);
        assert!(Stage::Transcription < Stage::Summary);
        assert_eq!(Stage::Summary.predecessor(), Some(Stage::Transcription));
        assert_eq!(Stage::Download.predecessor(), None);
        assert_eq!("summary".parse::<Stage>().unwrap(), Stage::Summary);
    }

    #[test]
    fn test_youtube_key() {
        assert_eq!(
            artifact_key("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10s"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(artifact_key("https://youtu.be/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_generic_key_is_deterministic() {
        let a = artifact_key("https://example.com/talk.mp4");
        let b = artifact_key("https://example.com/talk.mp4");
        let c = artifact_key("https://example.com/other.mp4");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_parse_url_list() {
        let batch = parse_url_list(
            "# lectures\n\
             https://youtu.be/dQw4w9WgXcQ\n\
             \n\
             not a url\n\
             ftp://example.com/file.mp3\n\
             https://example.com/a.mp3\n\
             https://youtu.be/dQw4w9WgXcQ\n",
        );

        assert_eq!(batch.jobs.len(), 2);
        assert_eq!(batch.jobs[0].position, 0);
        assert_eq!(batch.jobs[1].url, "https://example.com/a.mp3");
        assert_eq!(batch.jobs[1].position, 1);
        assert_eq!(batch.invalid, vec!["not a url", "ftp://example.com/file.mp3"]);
        assert_eq!(batch.duplicates, vec!["https://youtu.be/dQw4w9WgXcQ"]);
    }

    #[test]
    fn test_url_forms_of_one_video_become_one_job() {
        let batch = parse_url_list(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ\n\
             https://example.com/a.mp3\n\
             https://youtu.be/dQw4w9WgXcQ\n\
             https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10s\n",
        );

        let urls: Vec<_> = batch.jobs.iter().map(|j| j.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://www.youtube.com/watch?v=dQw4w9WgXcQ", "https://example.com/a.mp3"]
        );
        assert_eq!(batch.jobs[1].position, 1);
        assert_eq!(
            batch.duplicates,
            vec![
                "https://youtu.be/dQw4w9WgXcQ",
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10s"
            ]
        );
    }

    #[test]
    fn test_missing_url_list() {
        let result = read_url_list(Path::new("/nonexistent/urls.txt"));
        assert!(matches!(result, Err(VidpipeError::InvalidInput(_))));
    }
}
