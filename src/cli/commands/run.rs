//! Run command: process a URL list file end to end.

use crate::checkpoint::{CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
use crate::cli::preflight;
use crate::cli::Output;
use crate::config::Settings;
use crate::job::read_url_list;
use crate::orchestrator::Orchestrator;
use crate::report::ReportBuilder;
use crate::scheduler::WorkerPool;
use anyhow::Result;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Flags of the run command.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub urls_file: PathBuf,
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<u64>,
    pub report: Option<PathBuf>,
    pub no_checkpoint: bool,
}

impl RunOptions {
    /// Apply command-line overrides on top of the loaded settings.
    fn apply(&self, settings: &mut Settings) {
        if let Some(n) = self.concurrency {
            settings.pipeline.max_concurrency = n;
        }
        if let Some(n) = self.max_retries {
            settings.pipeline.max_retries = n;
        }
        if let Some(secs) = self.retry_delay {
            settings.pipeline.retry_base_delay_seconds = secs;
        }
    }
}

/// Run the batch.
pub async fn run_batch(
    options: RunOptions,
    mut settings: Settings,
    cancel: CancellationToken,
) -> Result<()> {
    options.apply(&mut settings);

    if let Err(e) = preflight::check(&settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'vidpipe doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let batch = read_url_list(&options.urls_file)?;
    for line in &batch.invalid {
        Output::warning(&format!("Skipping invalid input: {}", line));
    }
    for url in &batch.duplicates {
        Output::warning(&format!("Skipping duplicate video: {}", url));
    }

    let checkpoints: Arc<dyn CheckpointStore> = if options.no_checkpoint {
        Arc::new(MemoryCheckpointStore::new())
    } else {
        Arc::new(SqliteCheckpointStore::new(&settings.checkpoint_path())?)
    };

    let orchestrator = Orchestrator::from_settings(&settings, checkpoints)?
        .with_cancellation(cancel.clone());
    let pool = WorkerPool::new(Arc::new(orchestrator), settings.pipeline.max_concurrency);

    let total = batch.jobs.len();
    Output::info(&format!(
        "Processing {} URL(s), {} at a time",
        total,
        pool.max_concurrency()
    ));

    let mut builder = ReportBuilder::new()
        .with_invalid_inputs(batch.invalid)
        .with_duplicate_inputs(batch.duplicates);
    let progress = Output::progress_bar(total as u64, "jobs");

    let mut results = std::pin::pin!(pool.run(batch.jobs));
    while let Some(result) = results.next().await {
        progress.println(Output::job_line(&result));
        progress.inc(1);
        builder.record(result);
    }
    progress.finish_and_clear();

    let report = builder.finish();
    Output::report(&report);

    if let Some(path) = &options.report {
        report.write_json(path)?;
        Output::success(&format!("Report written to {}", path.display()));
    }

    if cancel.is_cancelled() {
        Output::warning("Batch cancelled. Run the same command again to resume.");
    } else if report.all_succeeded() {
        Output::success("All URLs processed.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let mut settings = Settings::default();
        let options = RunOptions {
            concurrency: Some(8),
            retry_delay: Some(1),
            ..Default::default()
        };
        options.apply(&mut settings);

        assert_eq!(settings.pipeline.max_concurrency, 8);
        assert_eq!(settings.pipeline.max_retries, 3);
        assert_eq!(settings.pipeline.retry_base_delay_seconds, 1);
    }
}
