//! Configuration module for vidpipe.
//!
//! Handles loading application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, SummaryPrompts, TranslationPrompts};
pub use settings::{
    CheckpointSettings, DownloadBackend, DownloadSettings, GeneralSettings, PipelineSettings,
    Settings, SummarizationBackend, SummarizationSettings, TranscriptionBackend,
    TranscriptionSettings,
};
