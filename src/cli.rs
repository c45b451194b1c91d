// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shipit::output::OutputMode;

#[derive(Parser)]
#[command(name = "shipit")]
#[command(about = "Build, verify and replace a single-host container service")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputMode::Normal)]
    pub output: OutputMode,

    /// Path to the config file (default: discovered from the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new shipit.yml configuration file
    Init {
        /// Container name (default: optitrade)
        #[arg(long)]
        container: Option<String>,

        /// Image reference (default: optitrade:latest)
        #[arg(long)]
        image: Option<String>,

        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Build, verify and replace the running container
    Deploy {
        /// Allow the engine build cache (disabled by default)
        #[arg(long)]
        use_cache: bool,
    },

    /// Run preflight and config validation without changing anything
    Check,

    /// Show the container's state and probe its health endpoint once
    Status,

    /// Print the container's logs
    Logs {
        /// Number of lines to show from the end of the logs
        #[arg(short = 'n', long, default_value_t = 100)]
        tail: u64,

        /// Follow log output
        #[arg(short, long)]
        follow: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn deploy_accepts_use_cache() {
        let cli = Cli::try_parse_from(["shipit", "deploy", "--use-cache"]).unwrap();
        assert!(matches!(cli.command, Commands::Deploy { use_cache: true }));
    }

    #[test]
    fn global_output_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["shipit", "check", "--output", "json"]).unwrap();
        assert_eq!(cli.output, OutputMode::Json);
    }

    #[test]
    fn logs_tail_defaults_to_100() {
        let cli = Cli::try_parse_from(["shipit", "logs"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Logs {
                tail: 100,
                follow: false
            }
        ));
    }
}
