mod cli;

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use zfsdriver::config::{Config, LoggingConfig};
use zfsdriver::driver::{DriverMetrics, GraphDriver, ZfsDriver, ensure_zfs_supported};
use zfsdriver::gateway::ProcessRunner;

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let default_filter = if verbose { "zfsdriver=debug".to_string() } else { logging.filter.clone() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr; stdout carries command results.
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(root) = cli.root {
        config.driver.root = root;
    }

    init_logging(&config.logging, cli.verbose);

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
            return Ok(ExitCode::SUCCESS);
        }
        Command::Probe => {
            ensure_zfs_supported(&config.driver.filesystems_path).await?;
            println!("zfs is supported");
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let registry = Arc::new(prometheus::Registry::new());
    let metrics = Arc::new(DriverMetrics::new(registry.clone())?);
    let runner = Arc::new(ProcessRunner::new(config.driver.command_timeout()));
    let driver = ZfsDriver::init(&config.driver, runner)
        .await
        .with_context(|| format!("Failed to initialize driver at {}", config.driver.root.display()))?
        .with_metrics(metrics);

    // Metrics are printed even when the command failed.
    let outcome = run_command(&driver, cli.command).await;
    if cli.metrics {
        eprint!("{}", encode_metrics(&registry)?);
    }

    outcome
}

async fn run_command(driver: &ZfsDriver, command: Command) -> anyhow::Result<ExitCode> {
    let code = match command {
        Command::Status { json: true } => {
            let status: serde_json::Map<String, serde_json::Value> = driver
                .status()
                .into_iter()
                .map(|(label, value)| (label, serde_json::Value::String(value)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&status)?);
            ExitCode::SUCCESS
        }
        Command::Status { json: false } => {
            for (label, value) in driver.status() {
                println!("{label}: {value}");
            }
            ExitCode::SUCCESS
        }
        Command::Create { id, parent } => {
            driver.create(&id, parent.as_deref()).await?;
            ExitCode::SUCCESS
        }
        Command::Remove { id } => {
            driver.remove(&id).await?;
            ExitCode::SUCCESS
        }
        Command::Get { id } => {
            println!("{}", driver.get(&id).await?.display());
            ExitCode::SUCCESS
        }
        Command::Exists { id } => {
            if driver.exists(&id).await { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        }
        Command::State { id } => {
            println!("{}", driver.state(&id).await?);
            ExitCode::SUCCESS
        }
        Command::Cleanup => {
            driver.cleanup().await?;
            ExitCode::SUCCESS
        }
        Command::Probe | Command::Config => ExitCode::SUCCESS,
    };

    Ok(code)
}

fn encode_metrics(registry: &prometheus::Registry) -> anyhow::Result<String> {
    Ok(prometheus::TextEncoder::new().encode_to_string(&registry.gather())?)
}
