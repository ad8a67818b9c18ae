use std::process::ExitCode;

use anyhow::{Context, Result};

use sake_lib::execute::clean;

use super::{Execution, Globals, Selection, build_options};
use crate::output::{print_info, print_json, print_stat, print_success};

/// Delete declared outputs and forget fingerprints so the next build reruns.
pub fn cmd_clean(globals: &Globals, targets: Vec<String>) -> Result<ExitCode> {
  let selection = Selection {
    targets,
    ..Default::default()
  };
  let options = build_options(globals, &selection, &Execution::default())?;
  let report = clean(&globals.file, &options).context("Clean failed")?;

  if globals.output.is_json() {
    print_json(&serde_json::json!({
      "removed": report.removed,
      "forgotten": report.forgotten,
    }))?;
    return Ok(ExitCode::SUCCESS);
  }

  if report.removed.is_empty() && report.forgotten.is_empty() {
    print_info("Nothing to clean");
  } else {
    print_success("Clean complete!");
    print_stat("Files removed", &report.removed.len().to_string());
    print_stat("Targets reset", &report.forgotten.len().to_string());
  }

  Ok(ExitCode::SUCCESS)
}
