//! nodepack - Node.js buildpack supply
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use nodepack::cli::{Cli, Commands};
use nodepack::config::BuildConfig;
use nodepack::error::NodepackResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> NodepackResult<()> {
    let cli = Cli::parse();

    // The staging environment is read exactly once
    let config = BuildConfig::from_env();

    // 0 = warn, 1 = info, 2+ (or BP_DEBUG) = debug
    let filter = match (cli.verbose, config.debug) {
        (0, false) => EnvFilter::new("nodepack=warn"),
        (1, false) => EnvFilter::new("nodepack=info"),
        _ => EnvFilter::new("nodepack=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Supply(args) => nodepack::cli::commands::supply(args, &config).await,
    }
}
