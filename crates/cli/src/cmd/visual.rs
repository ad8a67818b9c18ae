//! Implementation of the `sake visual` command.
//!
//! Exports the validated graph with each node's current status (fresh or
//! stale) as Graphviz dot or JSON.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use sake_lib::execute::status;
use sake_lib::graph::GraphExport;

use super::{Execution, Globals, Selection, build_options};
use crate::output::{GraphFormat, print_success};

pub fn cmd_visual(globals: &Globals, format: GraphFormat, output: Option<&Path>) -> Result<ExitCode> {
  let options = build_options(globals, &Selection::default(), &Execution::default())?;
  let report =
    status(&globals.file, &options).with_context(|| format!("Failed to read state for {}", globals.file.display()))?;

  let export = GraphExport::new(&report.graph, &report.statuses());
  let rendered = match format {
    GraphFormat::Dot => export.to_dot(),
    GraphFormat::Json => serde_json::to_string_pretty(&export).context("Failed to serialize graph")?,
  };

  match output {
    Some(path) => {
      std::fs::write(path, rendered).with_context(|| format!("Failed to write {}", path.display()))?;
      if !globals.output.is_json() {
        print_success(&format!("Wrote graph to {}", path.display()));
      }
    }
    None => println!("{}", rendered),
  }

  Ok(ExitCode::SUCCESS)
}
