//! vidpipe - resumable video processing pipeline
//!
//! Takes a batch of video URLs through download, transcription and
//! summarization. Every stage is checkpointed, so a rerun of the same batch
//! only does the work that is still missing.
//!
//! # Architecture
//!
//! - `job` - Jobs, stages and URL list ingestion
//! - `stage` - Strategy fallback with per-strategy retries
//! - `retry` - Linear backoff retry policy
//! - `checkpoint` - Durable per-URL stage completion
//! - `artifact` - Where stage outputs live
//! - `download`, `transcription`, `summarization` - Stage backends
//! - `orchestrator` - Per-URL stage sequencing and job-level retry
//! - `scheduler` - Bounded worker pool
//! - `report` - Batch aggregation
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use vidpipe::checkpoint::SqliteCheckpointStore;
//! use vidpipe::config::Settings;
//! use vidpipe::job::parse_url_list;
//! use vidpipe::orchestrator::Orchestrator;
//! use vidpipe::report::ReportBuilder;
//! use vidpipe::scheduler::WorkerPool;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let checkpoints = Arc::new(SqliteCheckpointStore::new(&settings.checkpoint_path())?);
//!     let orchestrator = Orchestrator::from_settings(&settings, checkpoints)?;
//!     let pool = WorkerPool::new(Arc::new(orchestrator), settings.pipeline.max_concurrency);
//!
//!     let batch = parse_url_list("https://youtu.be/dQw4w9WgXcQ\n");
//!     let mut report = ReportBuilder::new().with_invalid_inputs(batch.invalid);
//!     let mut results = std::pin::pin!(pool.run(batch.jobs));
//!     while let Some(result) = results.next().await {
//!         report.record(result);
//!     }
//!
//!     println!("{}", report.finish().to_json()?);
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod audio;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod job;
pub mod openai;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod stage;
pub mod summarization;
pub mod transcription;

pub use error::{Result, VidpipeError};
