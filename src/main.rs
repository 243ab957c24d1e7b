//! vidpipe CLI entry point.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vidpipe::cli::{commands, Cli, Commands, Output};
use vidpipe::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.as_ref().map(PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| settings.log_filter(cli.verbose)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match &cli.command {
        Commands::Run {
            urls_file,
            concurrency,
            max_retries,
            retry_delay,
            report,
            no_checkpoint,
        } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    Output::warning("Interrupted, stopping after in-flight stages are abandoned...");
                    on_signal.cancel();
                }
            });

            let options = commands::RunOptions {
                urls_file: PathBuf::from(urls_file),
                concurrency: *concurrency,
                max_retries: *max_retries,
                retry_delay: *retry_delay,
                report: report.as_ref().map(PathBuf::from),
                no_checkpoint: *no_checkpoint,
            };
            commands::run_batch(options, settings, cancel).await?;
        }

        Commands::Status { url } => {
            commands::run_status(url.as_deref(), &settings).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, config_path)?;
        }
    }

    Ok(())
}
