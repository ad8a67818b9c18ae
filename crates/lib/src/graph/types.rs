//! Types for the target dependency graph.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named unit of work: commands, dependencies and declared files.
///
/// Paths are expected to be absolute and normalised (the workflow parser
/// resolves them against the workflow directory). They double as HashStore
/// keys, so two spellings of the same file would otherwise be two entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
  /// Unique identifier within a graph.
  pub id: String,

  /// One-line description shown by `sake list`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub help: Option<String>,

  /// Shell commands, run in order.
  pub commands: Vec<String>,

  /// Identifiers of targets that must be built first.
  #[serde(default)]
  pub dependencies: Vec<String>,

  /// Files (not produced by any target) this target reads.
  #[serde(default)]
  pub inputs: Vec<PathBuf>,

  /// Files this target is expected to produce.
  #[serde(default)]
  pub outputs: Vec<PathBuf>,
}

impl Target {
  /// Create a target with no commands, dependencies or files.
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      help: None,
      commands: Vec::new(),
      dependencies: Vec::new(),
      inputs: Vec::new(),
      outputs: Vec::new(),
    }
  }

  pub fn help(mut self, help: impl Into<String>) -> Self {
    self.help = Some(help.into());
    self
  }

  pub fn command(mut self, command: impl Into<String>) -> Self {
    self.commands.push(command.into());
    self
  }

  pub fn depends_on(mut self, id: impl Into<String>) -> Self {
    self.dependencies.push(id.into());
    self
  }

  pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
    self.inputs.push(path.into());
    self
  }

  pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
    self.outputs.push(path.into());
    self
  }

  /// True when nothing about the target's surroundings can prove it fresh:
  /// no inputs, no dependencies and no outputs.
  pub fn is_unverifiable(&self) -> bool {
    self.inputs.is_empty() && self.dependencies.is_empty() && self.outputs.is_empty()
  }
}

/// Structural errors found while constructing or querying a graph.
///
/// All of these are fatal and surface before any command runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  /// The dependency relation contains a cycle.
  ///
  /// `cycle[i]` depends on `cycle[i + 1]`, and the last entry depends on the
  /// first.
  #[error("dependency cycle detected: {}", format_cycle(.cycle))]
  Cycle { cycle: Vec<String> },

  /// A target names a dependency that is not a target.
  #[error("target '{target}' depends on unknown target '{dependency}'")]
  UnknownDependency { target: String, dependency: String },

  /// Two targets share an identifier.
  #[error("duplicate target '{0}'")]
  DuplicateTarget(String),

  /// Two targets declare the same output file.
  #[error("output {path} is declared by both '{first}' and '{second}'")]
  ConflictingOutput {
    path: PathBuf,
    first: String,
    second: String,
  },

  /// A caller asked for a target that does not exist (force/only/clean).
  #[error("unknown target '{0}'")]
  UnknownTarget(String),
}

fn format_cycle(cycle: &[String]) -> String {
  match cycle.first() {
    Some(first) => format!("{} -> {}", cycle.join(" -> "), first),
    None => String::new(),
  }
}
