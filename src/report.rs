//! Batch result aggregation.

use crate::artifact::Locator;
use crate::error::Result;
use crate::job::Stage;
use crate::orchestrator::{JobFailure, JobResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Where a job ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    FullySuccessful,
    PartiallySuccessful,
    Failed,
}

impl JobResult {
    /// Summary in full, some stages done, or nothing done.
    pub fn outcome(&self) -> JobOutcome {
        if self.is_done() {
            JobOutcome::FullySuccessful
        } else if self.stages.is_empty() {
            JobOutcome::Failed
        } else {
            JobOutcome::PartiallySuccessful
        }
    }
}

/// Per-job line of the report.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub url: String,
    pub position: usize,
    pub title: Option<String>,
    pub artifacts: BTreeMap<Stage, Locator>,
    pub skipped: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    pub runs: u32,
}

impl From<&JobResult> for JobSummary {
    fn from(result: &JobResult) -> Self {
        Self {
            url: result.url.clone(),
            position: result.position,
            title: result.title.clone(),
            artifacts: result.stages.clone(),
            skipped: result.skipped.clone(),
            failure: result.failure.clone(),
            runs: result.runs,
        }
    }
}

/// How often a strategy was tried and how often it worked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyUsage {
    pub stage: Stage,
    pub strategy: String,
    pub attempts: u32,
    pub successes: u32,
}

/// The aggregate outcome of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub fully_successful: Vec<JobSummary>,
    pub partially_successful: Vec<JobSummary>,
    pub failed: Vec<JobSummary>,
    /// Lines of the input list that were not usable URLs.
    pub invalid_inputs: Vec<String>,
    /// URLs skipped because an earlier line names the same video.
    pub duplicate_inputs: Vec<String>,
    pub strategy_usage: Vec<StrategyUsage>,
}

impl BatchReport {
    /// Whether every job finished all stages.
    pub fn all_succeeded(&self) -> bool {
        self.partially_successful.is_empty() && self.failed.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Collects job results as they arrive.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    results: Vec<JobResult>,
    invalid_inputs: Vec<String>,
    duplicate_inputs: Vec<String>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invalid_inputs(mut self, invalid: Vec<String>) -> Self {
        self.invalid_inputs = invalid;
        self
    }

    pub fn with_duplicate_inputs(mut self, duplicates: Vec<String>) -> Self {
        self.duplicate_inputs = duplicates;
        self
    }

    pub fn record(&mut self, result: JobResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Bucket the results, each bucket in input order.
    pub fn finish(mut self) -> BatchReport {
        self.results.sort_by_key(|r| r.position);

        let mut usage: BTreeMap<(Stage, String), (u32, u32)> = BTreeMap::new();
        let mut report = BatchReport {
            total: self.results.len(),
            fully_successful: Vec::new(),
            partially_successful: Vec::new(),
            failed: Vec::new(),
            invalid_inputs: self.invalid_inputs,
            duplicate_inputs: self.duplicate_inputs,
            strategy_usage: Vec::new(),
        };

        for result in &self.results {
            for attempt in &result.attempts {
                let entry = usage
                    .entry((attempt.stage, attempt.strategy_id.clone()))
                    .or_default();
                entry.0 += 1;
                if attempt.succeeded() {
                    entry.1 += 1;
                }
            }

            let summary = JobSummary::from(result);
            match result.outcome() {
                JobOutcome::FullySuccessful => report.fully_successful.push(summary),
                JobOutcome::PartiallySuccessful => report.partially_successful.push(summary),
                JobOutcome::Failed => report.failed.push(summary),
            }
        }

        report.strategy_usage = usage
            .into_iter()
            .map(|((stage, strategy), (attempts, successes))| StrategyUsage {
                stage,
                strategy,
                attempts,
                successes,
            })
            .collect();

        report
    }
}
