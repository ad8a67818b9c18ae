//! Implementation of the `sake build` command.

use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::json;

use sake_lib::execute::{BuildStatus, build};

use super::{Execution, Globals, Selection, build_options};
use crate::output::{
  format_duration, print_error, print_info, print_json, print_stat, print_success, print_target, print_warning, tail,
};

const STDERR_TAIL_LINES: usize = 10;

/// Rebuild what is stale. Exits 1 if any scheduled target did not succeed.
pub fn cmd_build(globals: &Globals, selection: &Selection, execution: &Execution) -> Result<ExitCode> {
  let start = Instant::now();
  let options = build_options(globals, selection, execution)?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(build(&globals.file, &options))
    .with_context(|| format!("Build of {} failed", globals.file.display()))?;

  let code = if report.run.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  };

  if globals.output.is_json() {
    print_json(&json!({
      "dirty": report.dirty.ids().collect::<Vec<_>>(),
      "plan": report.plan,
      "result": report.run,
    }))?;
    return Ok(code);
  }

  if report.plan.is_empty() {
    print_info("Nothing to do: all targets are up to date");
    return Ok(code);
  }

  for id in report.plan.iter() {
    let Some(outcome) = report.run.per_target.get(id) else {
      continue;
    };
    let detail = match (&outcome.failure, outcome.status) {
      (Some(reason), _) => reason.to_string(),
      (None, BuildStatus::Stale) => report.dirty.reason(id).map(ToString::to_string).unwrap_or_default(),
      (None, _) => format_duration(outcome.duration),
    };
    print_target(id, outcome.status, &detail);

    if outcome.status == BuildStatus::Failed {
      for line in tail(&outcome.stderr, STDERR_TAIL_LINES) {
        eprintln!("      {}", line);
      }
    }
  }

  println!();
  let run = &report.run;
  if run.dry_run {
    print_info(&format!("Dry run: {} target(s) would run", report.plan.len()));
  } else if run.is_success() {
    print_success("Build complete!");
  } else {
    print_error("Build failed");
  }
  print_stat("Succeeded", &run.with_status(BuildStatus::Succeeded).len().to_string());
  let failed = run.with_status(BuildStatus::Failed);
  let skipped = run.with_status(BuildStatus::Skipped);
  if !failed.is_empty() {
    print_stat("Failed", &failed.join(", "));
  }
  if !skipped.is_empty() {
    print_stat("Skipped", &skipped.join(", "));
    print_warning("Skipped targets will be rebuilt on the next run");
  }
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(code)
}
