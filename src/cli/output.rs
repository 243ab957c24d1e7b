//! CLI output formatting utilities.

use crate::orchestrator::JobResult;
use crate::report::{BatchReport, JobOutcome, JobSummary};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Create a progress bar.
    pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        let template = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
        if let Ok(bar_style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(bar_style.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// One line per finished job, printed above the progress bar.
    pub fn job_line(result: &JobResult) -> String {
        let label = result.title.as_deref().unwrap_or(&result.url);
        match (result.outcome(), &result.failure) {
            (JobOutcome::FullySuccessful, _) => {
                format!("{} {}", style("✓").green(), label)
            }
            (_, Some(failure)) => {
                format!("{} {} ({})", style("✗").red(), label, style(failure).dim())
            }
            (_, None) => format!("{} {}", style("!").yellow(), label),
        }
    }

    /// Print the batch report.
    pub fn report(report: &BatchReport) {
        Output::header("Batch summary");
        Output::kv("Total", &report.total.to_string());
        Output::kv("Fully successful", &report.fully_successful.len().to_string());
        Output::kv("Partially successful", &report.partially_successful.len().to_string());
        Output::kv("Failed", &report.failed.len().to_string());

        if !report.partially_successful.is_empty() {
            Output::header("Partially successful");
            report.partially_successful.iter().for_each(print_job);
        }

        if !report.failed.is_empty() {
            Output::header("Failed");
            report.failed.iter().for_each(print_job);
        }

        if !report.invalid_inputs.is_empty() {
            Output::header("Invalid inputs");
            for line in &report.invalid_inputs {
                Output::list_item(line);
            }
        }

        if !report.duplicate_inputs.is_empty() {
            Output::header("Duplicate inputs");
            for url in &report.duplicate_inputs {
                Output::list_item(url);
            }
        }

        if !report.strategy_usage.is_empty() {
            Output::header("Strategy usage");
            for usage in &report.strategy_usage {
                Output::kv(
                    &format!("{}/{}", usage.stage, usage.strategy),
                    &format!("{} attempts, {} succeeded", usage.attempts, usage.successes),
                );
            }
        }
    }
}

fn print_job(job: &JobSummary) {
    let stages: Vec<&str> = job.artifacts.keys().map(|s| s.as_str()).collect();
    let done = if stages.is_empty() {
        "nothing completed".to_string()
    } else {
        format!("completed: {}", stages.join(", "))
    };
    Output::list_item(&format!("{} [{}]", style(&job.url).bold(), done));
    if let Some(failure) = &job.failure {
        println!("      {}", style(truncate(&failure.to_string(), 300)).dim());
    }
}

/// Truncate content with ellipsis.
fn truncate(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 8), "line one...");
        assert_eq!(truncate("ñandú ñandú", 5), "ñandú...");
    }
}
