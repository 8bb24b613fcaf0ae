//! Main entry point for the application.
//!
//! Initializes logging, loads environment variables from `.env` and runs the
//! selected command against a task definitions file.

use clap::Parser;
use colored::Colorize;
use taskweave::cli::{self, Cli};
use taskweave::utils;
use tracing::debug;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    utils::init_logging(&cli.logging_level, cli.log_dir.as_deref());

    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {}", e);
    }

    if let Err(e) = cli::execute(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
