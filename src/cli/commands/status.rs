//! Status command: inspect checkpoint records.

use crate::checkpoint::{CheckpointRecord, CheckpointStore, SqliteCheckpointStore};
use crate::cli::Output;
use crate::config::Settings;
use crate::job::Stage;
use anyhow::Result;
use console::style;

/// Print the checkpoint record for `url`, or every record.
pub async fn run_status(url: Option<&str>, settings: &Settings) -> Result<()> {
    let path = settings.checkpoint_path();
    if !path.exists() {
        Output::warning(&format!("No checkpoint database at {}", path.display()));
        return Ok(());
    }

    let store = SqliteCheckpointStore::new(&path)?;
    let records = match url {
        Some(url) => store.get_record(url).await?.into_iter().collect(),
        None => store.list_records().await?,
    };

    if records.is_empty() {
        Output::info("No checkpoint records found.");
        return Ok(());
    }

    Output::header(&format!("{} record(s)", records.len()));
    for record in &records {
        print_record(record);
    }

    Ok(())
}

fn print_record(record: &CheckpointRecord) {
    let label = record.title.as_deref().unwrap_or("(untitled)");
    println!("\n{} {}", style(label).bold(), style(&record.url).dim());

    for stage in Stage::ALL {
        let line = match record.stage_artifacts.get(&stage) {
            Some(locator) => format!("{} {}", style("✓").green(), locator),
            None if record.failed_stage == Some(stage) => style("✗ failed").red().to_string(),
            None => style("- pending").dim().to_string(),
        };
        Output::kv(stage.as_str(), &line);
    }

    if let Some(error) = &record.last_error {
        Output::kv("last error", error);
    }
    Output::kv("updated", &record.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
}
