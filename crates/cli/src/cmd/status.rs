//! Status command implementation.
//!
//! Displays which targets are fresh or stale and the order a build would run.

use std::process::ExitCode;

use anyhow::{Context, Result};
use serde_json::json;

use sake_lib::execute::{BuildStatus, status};

use super::{Execution, Globals, Selection, build_options};
use crate::output::{print_info, print_json, print_stat, print_success, print_target};

pub fn cmd_status(globals: &Globals, selection: &Selection) -> Result<ExitCode> {
  let options = build_options(globals, selection, &Execution::default())?;
  let report =
    status(&globals.file, &options).with_context(|| format!("Failed to read state for {}", globals.file.display()))?;
  let statuses = report.statuses();

  if globals.output.is_json() {
    let targets: Vec<_> = report
      .graph
      .targets()
      .map(|t| {
        json!({
          "id": t.id,
          "status": statuses.get(&t.id),
          "reason": report.dirty.reason(&t.id).map(ToString::to_string),
        })
      })
      .collect();
    print_json(&json!({ "targets": targets, "plan": report.plan }))?;
    return Ok(ExitCode::SUCCESS);
  }

  for target in report.graph.targets() {
    let status = statuses.get(&target.id).copied().unwrap_or(BuildStatus::Fresh);
    let detail = match report.dirty.reason(&target.id) {
      Some(reason) => reason.to_string(),
      None if status == BuildStatus::Stale => "upstream changed".to_string(),
      None => "fresh".to_string(),
    };
    print_target(&target.id, status, &detail);
  }

  println!();
  if report.plan.is_empty() {
    print_success("All targets are up to date");
  } else {
    print_info(&format!("{} target(s) would run", report.plan.len()));
    print_stat("Order", &report.plan.ids().join(" → "));
  }

  Ok(ExitCode::SUCCESS)
}
