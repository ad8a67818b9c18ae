use std::process::ExitCode;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde_json::json;

use sake_lib::execute::{BuildOptions, load_graph};

use super::Globals;
use crate::output::{print_info, print_json};

/// Print every target with its help text, in declaration order.
pub fn cmd_list(globals: &Globals) -> Result<ExitCode> {
  let options = BuildOptions {
    macros: globals.macros()?,
    ..Default::default()
  };
  let (graph, _) =
    load_graph(&globals.file, &options).with_context(|| format!("Failed to load {}", globals.file.display()))?;

  if globals.output.is_json() {
    let targets: Vec<_> = graph
      .targets()
      .map(|t| json!({ "id": t.id, "help": t.help, "dependencies": t.dependencies }))
      .collect();
    print_json(&targets)?;
    return Ok(ExitCode::SUCCESS);
  }

  if graph.is_empty() {
    print_info("No targets defined");
    return Ok(ExitCode::SUCCESS);
  }

  let width = graph.targets().map(|t| t.id.len()).max().unwrap_or(0);
  for target in graph.targets() {
    let help = target.help.as_deref().unwrap_or("(no help)");
    let id = format!("{:width$}", target.id, width = width);
    println!(
      "  {}  {}",
      id.if_supports_color(Stream::Stdout, |s| s.bold()),
      help.if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }

  Ok(ExitCode::SUCCESS)
}
