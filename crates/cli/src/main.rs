mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, print_error};

/// wdeploy - incremental deployment of web projects
#[derive(Parser)]
#[command(name = "wdeploy")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log output (-v for info, -vv for debug)
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the configured deployment tasks
  Run {
    /// Path to the configuration file (default: $WDEPLOY_CONFIG or ./wdeploy.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only run tasks with this name (repeatable)
    #[arg(short, long = "task", value_name = "NAME")]
    tasks: Vec<String>,

    /// Re-run through `sudo -E` when not running as root
    #[arg(long)]
    sudo: bool,
  },

  /// List the configured tasks
  Tasks {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Validate the configuration without running anything
  Check {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
  },
}

fn init_tracing(verbose: u8) {
  let level = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Run { config, tasks, sudo } => cmd::cmd_run(config.as_deref(), &tasks, sudo),
    Commands::Tasks { config, output } => cmd::cmd_tasks(config.as_deref(), output),
    Commands::Check { config } => cmd::cmd_check(config.as_deref()),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}
