mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pakt_lib::target::{Address, ExecutionMode};

use cmd::{PackageArgs, cmd_info, cmd_inspect, cmd_package};
use output::{OutputFormat, print_error};

/// pakt - package build targets into self-contained artifacts
#[derive(Parser)]
#[command(name = "pakt")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Artifact store directory (defaults to $PAKT_STORE or the user cache)
  #[arg(long, global = true)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Package targets into artifacts
  Package(PackageArgs),

  /// Show the resolved plan for a target without building it
  Inspect {
    /// Project file or directory containing pakt.json
    project: PathBuf,

    /// Target to inspect
    address: Address,

    /// Execution mode override (zipapp or venv)
    #[arg(long)]
    mode: Option<ExecutionMode>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show host platform and store information
  Info {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(e) = run(cli) {
    print_error(&format!("{e:#}"));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  let store = cli.store.as_deref();
  match cli.command {
    Commands::Package(args) => cmd_package(args, store),
    Commands::Inspect {
      project,
      address,
      mode,
      output,
    } => cmd_inspect(&project, &address, mode, output),
    Commands::Info { output } => cmd_info(store, output),
  }
}
