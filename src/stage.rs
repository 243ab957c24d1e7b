//! Generic stage execution with strategy fallback.
//!
//! A stage owns an ordered list of strategies. Each strategy gets the full
//! retry budget before the executor moves on to the next one; errors that
//! retrying cannot fix short-circuit that budget.

use crate::artifact::Locator;
use crate::error::{ErrorClass, Result, VidpipeError};
use crate::job::{Job, Stage};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// A backend that can perform one stage.
pub trait Strategy: Send + Sync {
    /// Stable identifier used in logs, attempts and reports.
    fn id(&self) -> &str;
}

/// One execution of one stage via one strategy.
#[derive(Debug, Clone, Serialize)]
pub struct StageAttempt {
    pub stage: Stage,
    pub strategy_id: String,
    pub attempt_number: u32,
    /// `None` when the attempt succeeded.
    pub error: Option<String>,
}

impl StageAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Why a stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InputMissing,
    AllStrategiesExhausted,
    AuthenticationFailure,
    Cancelled,
    /// Checkpoint or artifact bookkeeping failed around an otherwise finished stage.
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::InputMissing => "input missing",
            FailureKind::AllStrategiesExhausted => "all strategies exhausted",
            FailureKind::AuthenticationFailure => "authentication failure",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}

/// Final error reported by one strategy.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyError {
    pub strategy: String,
    pub class: ErrorClass,
    pub message: String,
}

/// A terminal stage failure with the per-strategy errors that led to it.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub kind: FailureKind,
    pub errors: Vec<StrategyError>,
}

impl StageFailure {
    pub fn new(kind: FailureKind, errors: Vec<StrategyError>) -> Self {
        Self { kind, errors }
    }

    /// Failure caused by a single error outside any strategy.
    pub fn from_error(source: &str, error: &VidpipeError) -> Self {
        let class = error.class();
        let kind = match class {
            ErrorClass::InputMissing => FailureKind::InputMissing,
            ErrorClass::Authentication => FailureKind::AuthenticationFailure,
            ErrorClass::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Internal,
        };
        Self::new(
            kind,
            vec![StrategyError {
                strategy: source.to_string(),
                class,
                message: error.to_string(),
            }],
        )
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, Vec::new())
    }

    /// Whether any strategy rejected the input for being too large.
    pub fn input_too_large(&self) -> bool {
        self.errors.iter().any(|e| e.class == ErrorClass::TooLarge)
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        for (i, err) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}: {}", sep, err.strategy, err.message)?;
        }
        Ok(())
    }
}

/// Result recorded for a stage.
#[derive(Debug, Clone)]
pub enum StageOutcome<T> {
    Completed(T),
    Failed(StageFailure),
}

/// A stage outcome plus every attempt made to reach it.
#[derive(Debug, Clone)]
pub struct StageRun<T> {
    pub outcome: StageOutcome<T>,
    pub attempts: Vec<StageAttempt>,
}

impl<T> StageRun<T> {
    pub fn completed(value: T, attempts: Vec<StageAttempt>) -> Self {
        Self {
            outcome: StageOutcome::Completed(value),
            attempts,
        }
    }

    pub fn failed(failure: StageFailure, attempts: Vec<StageAttempt>) -> Self {
        Self {
            outcome: StageOutcome::Failed(failure),
            attempts,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageRun<U> {
        let outcome = match self.outcome {
            StageOutcome::Completed(v) => StageOutcome::Completed(f(v)),
            StageOutcome::Failed(e) => StageOutcome::Failed(e),
        };
        StageRun {
            outcome,
            attempts: self.attempts,
        }
    }
}

/// Tries strategies in priority order, each wrapped by the retry policy.
#[derive(Debug, Clone, Default)]
pub struct StageExecutor {
    retry: RetryPolicy,
}

impl StageExecutor {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `attempt` against each strategy until one succeeds.
    ///
    /// Authentication errors abort the stage, missing input is fatal, and
    /// unavailable or too-large strategies are skipped without retries.
    pub async fn execute<S, T, F, Fut>(
        &self,
        stage: Stage,
        strategies: &[Arc<S>],
        mut attempt: F,
    ) -> StageRun<T>
    where
        S: Strategy + ?Sized,
        F: FnMut(Arc<S>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = Vec::new();
        let mut errors = Vec::new();

        for strategy in strategies {
            let id = strategy.id().to_string();
            let label = format!("{} via {}", stage, id);

            let outcome = self.retry.run(&label, || attempt(Arc::clone(strategy))).await;

            attempts.extend(outcome.attempts.iter().map(|a| StageAttempt {
                stage,
                strategy_id: id.clone(),
                attempt_number: a.attempt,
                error: a.error.clone(),
            }));

            let error = match outcome.result {
                Ok(value) => {
                    info!("{} succeeded", label);
                    return StageRun::completed(value, attempts);
                }
                Err(e) => e,
            };

            let class = error.class();
            errors.push(StrategyError {
                strategy: id,
                class,
                message: error.to_string(),
            });

            let fatal = match class {
                ErrorClass::Authentication => Some(FailureKind::AuthenticationFailure),
                ErrorClass::InputMissing => Some(FailureKind::InputMissing),
                ErrorClass::Cancelled => Some(FailureKind::Cancelled),
                ErrorClass::Unavailable | ErrorClass::TooLarge => {
                    info!("{} skipped: {}", label, error);
                    None
                }
                ErrorClass::Transient | ErrorClass::RateLimited => {
                    warn!("{} exhausted its retries, falling back", label);
                    None
                }
            };

            if let Some(kind) = fatal {
                warn!("{} aborted: {}", stage, error);
                return StageRun::failed(StageFailure::new(kind, errors), attempts);
            }
        }

        if strategies.is_empty() {
            errors.push(StrategyError {
                strategy: "none".to_string(),
                class: ErrorClass::Unavailable,
                message: format!("no {} strategies configured", stage),
            });
        }

        StageRun::failed(
            StageFailure::new(FailureKind::AllStrategiesExhausted, errors),
            attempts,
        )
    }
}

/// Output of a completed stage run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub locator: Locator,
    /// Media title, reported by downloads.
    pub title: Option<String>,
}

impl StageOutput {
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            title: None,
        }
    }
}

/// One pipeline stage as seen by the orchestrator.
#[async_trait]
pub trait StageRunner: Send + Sync {
    fn stage(&self) -> Stage;

    /// The stage's output at its canonical location, if an earlier run left one.
    async fn existing(&self, job: &Job) -> Option<Locator>;

    /// Produce the stage output. `input` is the previous stage's artifact.
    async fn run(
        &self,
        job: &Job,
        input: Option<&Locator>,
        executor: &StageExecutor,
    ) -> StageRun<StageOutput>;

    /// Best-effort extras for an output that was already in place when the
    /// stage was skipped.
    async fn complete_existing(&self, _job: &Job, _output: &Locator, _executor: &StageExecutor) {}
}
