mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sake_lib::consts::DEFAULT_WORKFLOW_FILE;

use crate::cmd::{cmd_build, cmd_clean, cmd_list, cmd_status, cmd_visual};
use crate::output::{GraphFormat, OutputFormat, print_error};

/// Content-hash driven workflow builds
#[derive(Parser)]
#[command(name = "sake")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging (overridden by SAKE_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Workflow file to read
  #[arg(short = 'f', long = "file", global = true, default_value = DEFAULT_WORKFLOW_FILE)]
  file: PathBuf,

  /// Define or override a macro
  #[arg(short = 'D', long = "define", value_name = "NAME=VALUE", global = true)]
  define: Vec<String>,

  /// Print machine-readable JSON
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Rebuild stale targets and everything downstream of them
  Build(BuildArgs),

  /// Show which targets are stale and what a build would run
  Status(SelectArgs),

  /// List targets with their help text
  List,

  /// Export the dependency graph
  Visual {
    /// Export format
    #[arg(long, value_enum, default_value_t = GraphFormat::Dot)]
    format: GraphFormat,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Delete declared outputs and forget their fingerprints
  Clean {
    /// Targets to clean (default: all)
    targets: Vec<String>,
  },
}

/// Target selection and staleness overrides.
#[derive(Args)]
struct SelectArgs {
  /// Only consider these targets and their dependencies
  targets: Vec<String>,

  /// Rebuild this target even if it is fresh
  #[arg(short = 'F', long = "force", value_name = "TARGET")]
  force: Vec<String>,

  /// Rebuild every target
  #[arg(long)]
  force_all: bool,

  /// Treat this target as fresh even though nothing can verify it
  #[arg(long = "assume-fresh", value_name = "TARGET")]
  assume_fresh: Vec<String>,
}

#[derive(Args)]
struct BuildArgs {
  #[command(flatten)]
  select: SelectArgs,

  /// Maximum number of targets to run at once
  #[arg(short = 'j', long, env = "SAKE_JOBS")]
  jobs: Option<usize>,

  /// Kill commands that run longer than this (e.g. "30s", "5m")
  #[arg(long, value_parser = humantime::parse_duration)]
  timeout: Option<Duration>,

  /// Shell used to run commands
  #[arg(long)]
  shell: Option<String>,

  /// Show what would run without running it
  #[arg(short = 'n', long)]
  dry_run: bool,

  /// Stop dispatching targets after the first failure
  #[arg(long)]
  fail_fast: bool,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_env("SAKE_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let output = if cli.json { OutputFormat::Json } else { OutputFormat::Text };
  let globals = cmd::Globals {
    file: cli.file,
    define: cli.define,
    output,
  };

  let result = match cli.command {
    Commands::Build(args) => cmd_build(
      &globals,
      &cmd::Selection {
        targets: args.select.targets,
        force: args.select.force,
        force_all: args.select.force_all,
        assume_fresh: args.select.assume_fresh,
      },
      &cmd::Execution {
        jobs: args.jobs,
        timeout: args.timeout,
        shell: args.shell,
        dry_run: args.dry_run,
        fail_fast: args.fail_fast,
      },
    ),
    Commands::Status(select) => cmd_status(
      &globals,
      &cmd::Selection {
        targets: select.targets,
        force: select.force,
        force_all: select.force_all,
        assume_fresh: select.assume_fresh,
      },
    ),
    Commands::List => cmd_list(&globals),
    Commands::Visual { format, output } => cmd_visual(&globals, format, output.as_deref()),
    Commands::Clean { targets } => cmd_clean(&globals, targets),
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::from(2)
    }
  }
}
