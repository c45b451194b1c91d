// ABOUTME: Entry point for the shipit CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use std::env;
use std::path::Path;

use clap::Parser;
use cli::{Cli, Commands};
use shipit::config::{self, RunConfig};
use shipit::error::{Error, Result};
use shipit::output::Output;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(cli.output);
    let result = run(cli).await;

    match result {
        Ok(()) => {}
        // The run report has already been printed.
        Err(Error::RunFailed { .. }) => std::process::exit(1),
        Err(e) => {
            output.error(&e.to_string());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir()?;
    let output = Output::new(cli.output);

    match cli.command {
        Commands::Init {
            container,
            image,
            force,
        } => {
            config::init_config(&cwd, container.as_deref(), image.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Deploy { use_cache } => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            commands::deploy(config, use_cache, output).await
        }
        Commands::Check => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            commands::check(config, output).await
        }
        Commands::Status => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            commands::status(config, output).await
        }
        Commands::Logs { tail, follow } => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            commands::logs(config, tail, follow, output).await
        }
    }
}

fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<RunConfig> {
    match explicit {
        Some(path) => RunConfig::load(path),
        None => RunConfig::discover(cwd),
    }
}
