mod build;
mod clean;
mod list;
mod status;
mod visual;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use sake_lib::execute::{BuildOptions, ExecuteConfig};
use sake_lib::sakefile::macros::parse_override;

use crate::output::OutputFormat;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use list::cmd_list;
pub use status::cmd_status;
pub use visual::cmd_visual;

/// Flags shared by every subcommand.
pub struct Globals {
  pub file: PathBuf,
  pub define: Vec<String>,
  pub output: OutputFormat,
}

/// Which targets to consider and how to override staleness.
#[derive(Default)]
pub struct Selection {
  pub targets: Vec<String>,
  pub force: Vec<String>,
  pub force_all: bool,
  pub assume_fresh: Vec<String>,
}

/// Execution flags for `build`.
#[derive(Default)]
pub struct Execution {
  pub jobs: Option<usize>,
  pub timeout: Option<Duration>,
  pub shell: Option<String>,
  pub dry_run: bool,
  pub fail_fast: bool,
}

impl Globals {
  fn macros(&self) -> Result<BTreeMap<String, String>> {
    self
      .define
      .iter()
      .map(|d| parse_override(d).with_context(|| format!("Invalid -D value '{d}'")))
      .collect()
  }
}

/// Translate CLI flags into library options.
fn build_options(globals: &Globals, selection: &Selection, execution: &Execution) -> Result<BuildOptions> {
  let mut execute = ExecuteConfig {
    timeout: execution.timeout,
    shell: execution.shell.clone(),
    dry_run: execution.dry_run,
    fail_fast: execution.fail_fast,
    ..Default::default()
  };
  if let Some(jobs) = execution.jobs {
    execute.parallelism = jobs.max(1);
  }

  Ok(BuildOptions {
    execute,
    force: selection.force.iter().cloned().collect(),
    force_all: selection.force_all,
    assume_fresh: selection.assume_fresh.iter().cloned().collect(),
    only: (!selection.targets.is_empty()).then(|| selection.targets.clone()),
    macros: globals.macros()?,
    state_dir: None,
  })
}
