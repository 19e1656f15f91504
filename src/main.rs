use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::runtime::Builder;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use emrlink::cli::{Cli, Commands};
use emrlink::connector::Connector;

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Calls are awaited one after another; two workers cover the HTTP client's background tasks
    let worker_threads = std::thread::available_parallelism()
        .map(|n| n.get().min(2))
        .unwrap_or(2);
    debug!("Configuring Tokio runtime with {} worker threads", worker_threads);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = cli.settings();
    debug!("Settings: {:?}", settings);

    let connector = Connector::from_settings(settings).context("Failed to initialize AWS clients")?;

    let Commands::Connect { json, .. } = &cli.command;
    let request = cli.command.to_request();

    match connector.connect(&request).await {
        Ok(report) => {
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            eprintln!("Failed while {}: {}", failure.stage, failure.error);
            Ok(ExitCode::FAILURE)
        }
    }
}
