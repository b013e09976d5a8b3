//! resfetch - resource fetch and cache engine
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use resfetch::cli::{Cli, Commands};
use resfetch::config::{Config, ConfigManager};
use resfetch::error::ResfetchResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => exit_code(code),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            } else if e.is_retryable() {
                eprintln!(
                    "{} {}",
                    style("Hint:").yellow(),
                    "This failure may be transient; re-running the command may succeed"
                );
            }
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}

fn init_logging(verbose: u8, config: &Config) {
    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("resfetch=warn"),
        1 => EnvFilter::new("resfetch=info"),
        _ => EnvFilter::new("resfetch=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

async fn run() -> ResfetchResult<i32> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);

    match cli.command {
        Commands::Fetch(args) => resfetch::cli::commands::fetch(args, &config).await?,
        Commands::Put(args) => resfetch::cli::commands::put(args, &config).await?,
        Commands::Check(args) => resfetch::cli::commands::check(args, &config).await?,
        Commands::Task(args) => return resfetch::cli::commands::task(args, &config).await,
        Commands::Cache(args) => resfetch::cli::commands::cache(args, &config).await?,
        Commands::Config(args) => {
            resfetch::cli::commands::config(args, &config, &config_manager).await?
        }
    }

    Ok(0)
}
