use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

mod cli;

use cli::Cli;
use cli::commands::Commands;
use retrigger::config::RetriggerConfig;
use retrigger::domain::LogRef;
use retrigger::scan::{LogScanner, ScanOutcome};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("retrigger")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("retrigger.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &RetriggerConfig) -> Result<()> {
    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Config => handle_config_command(config),
        Commands::Delays { attempts } => handle_delays_command(*attempts, config),
        Commands::Scan {
            log,
            pattern,
            timeout_ms,
        } => handle_scan_command(log, pattern.as_deref(), *timeout_ms, config).await,
    }
}

fn handle_config_command(config: &RetriggerConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to render config")?;
    print!("{}", yaml);
    Ok(())
}

fn handle_delays_command(attempts: u32, config: &RetriggerConfig) -> Result<()> {
    let delay = &config.request.delay;
    println!("{} {}", "Delay:".green(), delay.display_name());
    for retry_count in 0..attempts {
        println!("  retry {:>3}: {}s", retry_count + 1, delay.compute_delay(retry_count));
    }
    let max_schedule = config.request.max_schedule;
    if max_schedule > 0 && attempts > max_schedule as u32 {
        println!(
            "{}",
            format!("Retries after {} are not scheduled (max-schedule)", max_schedule).yellow()
        );
    }
    Ok(())
}

async fn handle_scan_command(
    log: &Path,
    pattern: Option<&str>,
    timeout_ms: Option<u64>,
    config: &RetriggerConfig,
) -> Result<()> {
    let pattern = pattern
        .or(config.request.pattern.as_deref())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| eyre::eyre!("No pattern given and request.pattern is not set"))?;
    let regex = Regex::new(pattern).context("Invalid pattern")?;
    let scanner = match timeout_ms {
        Some(ms) => LogScanner::new(ms).context("Invalid timeout")?,
        None => config.scanner()?,
    };

    info!("Scanning {} for '{}'", log.display(), pattern);
    match scanner.scan(&LogRef::file(log), &regex).await {
        ScanOutcome::Matched { text, captured } => {
            println!("{} {}", "Matched:".green(), text);
            if let Some(value) = captured {
                println!("  captured: {}", value);
            }
        }
        ScanOutcome::NoMatch => println!("{}", "No match".yellow()),
        ScanOutcome::TimedOut => println!(
            "{} after {} ms",
            "Timed out".red(),
            scanner.timeout().as_millis()
        ),
        ScanOutcome::Failed(reason) => eyre::bail!("Failed to read {}: {}", log.display(), reason),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = RetriggerConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
