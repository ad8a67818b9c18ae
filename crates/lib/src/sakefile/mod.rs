//! Workflow file parsing.
//!
//! A Sakefile is a YAML mapping from target name to a target description:
//!
//! ```yaml
//! #! CC = gcc
//! compile:
//!   help: build the binary
//!   dependencies:
//!     - main.c
//!   formula: $CC -o app main.c
//!   output:
//!     - app
//! ```
//!
//! `dependencies` entries that name another target become target
//! dependencies; everything else is a file input. A file input that another
//! target declares as an output also becomes a dependency on that target.

pub mod macros;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::debug;

use crate::graph::Target;
use crate::util::paths::{normalize, workflow_base_dir};

#[derive(Debug, Error)]
pub enum SakefileError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid YAML: {0}")]
  Parse(#[from] serde_yaml::Error),

  #[error("workflow file must be a mapping of target names to targets")]
  NotAMapping,

  #[error("target '{target}': {reason}")]
  InvalidTarget { target: String, reason: String },

  #[error("target '{0}' depends on itself")]
  SelfDependency(String),

  #[error("target '{0}' is defined more than once")]
  DuplicateTarget(String),

  #[error("invalid macro definition at line {line}: {text}")]
  InvalidMacro { line: usize, text: String },
}

/// A parsed workflow file.
#[derive(Debug, Clone)]
pub struct Sakefile {
  /// Directory holding the workflow file; commands run here and relative
  /// paths resolve against it.
  pub base_dir: PathBuf,

  /// Macros after applying overrides.
  pub macros: BTreeMap<String, String>,

  /// Targets in declaration order.
  pub targets: Vec<Target>,
}

/// Read and parse the workflow file at `path`.
pub fn load(path: &Path, overrides: &BTreeMap<String, String>) -> Result<Sakefile, SakefileError> {
  let source = std::fs::read_to_string(path).map_err(|source| SakefileError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let base_dir = workflow_base_dir(path).map_err(|source| SakefileError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  parse(&source, &base_dir, overrides)
}

/// Parse workflow text whose relative paths resolve against `base_dir`.
pub fn parse(source: &str, base_dir: &Path, overrides: &BTreeMap<String, String>) -> Result<Sakefile, SakefileError> {
  check_duplicate_keys(source)?;
  let macros = macros::collect(source, overrides)?;

  let document: Value = serde_yaml::from_str(source)?;
  let mapping = match document {
    Value::Mapping(mapping) => mapping,
    Value::Null => Mapping::new(),
    _ => return Err(SakefileError::NotAMapping),
  };

  let mut names = Vec::with_capacity(mapping.len());
  for key in mapping.keys() {
    let name = key.as_str().ok_or(SakefileError::NotAMapping)?;
    names.push(macros::expand(name, &macros));
  }
  let known: HashSet<&str> = names.iter().map(String::as_str).collect();

  let mut targets = Vec::with_capacity(names.len());
  for (name, body) in names.iter().zip(mapping.values()) {
    let raw = RawTarget::from_value(name, body, &macros)?;
    targets.push(raw.into_target(name, base_dir, &known)?);
  }

  infer_file_dependencies(&mut targets);
  debug!(targets = targets.len(), macros = macros.len(), "parsed workflow");

  Ok(Sakefile {
    base_dir: base_dir.to_path_buf(),
    macros,
    targets,
  })
}

/// Unindented `name:` lines are target keys; YAML parsers disagree on
/// whether repeats are an error, so catch them here.
fn check_duplicate_keys(source: &str) -> Result<(), SakefileError> {
  let mut seen = HashSet::new();
  for line in source.lines() {
    if line.is_empty() || line.starts_with([' ', '\t', '#', '-']) || line.starts_with("...") {
      continue;
    }
    let Some(key) = top_level_key(line) else {
      continue;
    };
    if !seen.insert(key.to_string()) {
      return Err(SakefileError::DuplicateTarget(key.to_string()));
    }
  }
  Ok(())
}

/// Key of a `key: value` line. A quoted key may itself contain `:`.
fn top_level_key(line: &str) -> Option<&str> {
  if let Some(quote) = line.chars().next().filter(|c| *c == '"' || *c == '\'') {
    let end = line[1..].find(quote)? + 1;
    return line[end + 1..].trim_start().starts_with(':').then(|| &line[1..end]);
  }
  let sep = line
    .find(": ")
    .or_else(|| line.trim_end().strip_suffix(':').map(str::len))?;
  Some(line[..sep].trim())
}

/// String fields of one target, macros expanded.
struct RawTarget {
  help: Option<String>,
  dependencies: Vec<String>,
  inputs: Vec<String>,
  commands: Vec<String>,
  outputs: Vec<String>,
}

impl RawTarget {
  fn from_value(name: &str, body: &Value, macros: &BTreeMap<String, String>) -> Result<Self, SakefileError> {
    let invalid = |reason: &str| SakefileError::InvalidTarget {
      target: name.to_string(),
      reason: reason.to_string(),
    };

    let Value::Mapping(fields) = body else {
      return Err(invalid("target must be a mapping"));
    };

    let help = match fields.get("help") {
      None | Some(Value::Null) => None,
      Some(Value::String(s)) => Some(macros::expand(s, macros)),
      Some(_) => return Err(invalid("'help' must be a string")),
    };

    let formula = match fields.get("formula") {
      Some(Value::String(s)) => macros::expand(s, macros),
      Some(_) => return Err(invalid("'formula' must be a string")),
      None => return Err(invalid("missing 'formula'")),
    };

    let list = |key: &str| -> Result<Vec<String>, SakefileError> {
      match fields.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![macros::expand(s, macros)]),
        Some(Value::Sequence(items)) => items
          .iter()
          .map(|item| match item {
            Value::String(s) => Ok(macros::expand(s, macros)),
            _ => Err(invalid(&format!("entries of '{key}' must be strings"))),
          })
          .collect(),
        Some(_) => Err(invalid(&format!("'{key}' must be a list of strings"))),
      }
    };

    let mut outputs = list("output")?;
    outputs.extend(list("outputs")?);

    Ok(Self {
      help,
      dependencies: list("dependencies")?,
      inputs: list("inputs")?,
      commands: split_formula(&formula),
      outputs,
    })
  }

  fn into_target(self, name: &str, base_dir: &Path, known: &HashSet<&str>) -> Result<Target, SakefileError> {
    let mut target = Target::new(name);
    target.help = self.help;
    target.commands = self.commands;

    for dep in self.dependencies {
      if dep == name {
        return Err(SakefileError::SelfDependency(name.to_string()));
      }
      if known.contains(dep.as_str()) {
        target = target.depends_on(dep);
      } else {
        target = target.input(normalize(base_dir, Path::new(&dep)));
      }
    }
    for input in self.inputs {
      target = target.input(normalize(base_dir, Path::new(&input)));
    }
    for output in self.outputs {
      target = target.output(normalize(base_dir, Path::new(&output)));
    }

    Ok(target)
  }
}

/// One command per non-blank line; a trailing `\` joins the next line.
fn split_formula(formula: &str) -> Vec<String> {
  let mut commands = Vec::new();
  let mut current = String::new();

  for line in formula.lines() {
    let line = line.trim();
    if let Some(head) = line.strip_suffix('\\') {
      current.push_str(head.trim_end());
      current.push(' ');
      continue;
    }
    current.push_str(line);
    let command = current.trim();
    if !command.is_empty() {
      commands.push(command.to_string());
    }
    current.clear();
  }

  let tail = current.trim();
  if !tail.is_empty() {
    commands.push(tail.to_string());
  }
  commands
}

/// Make consumers of a file depend on the target that outputs it.
fn infer_file_dependencies(targets: &mut [Target]) {
  let producers: HashMap<PathBuf, String> = targets
    .iter()
    .flat_map(|t| t.outputs.iter().map(|o| (o.clone(), t.id.clone())))
    .collect();

  for target in targets.iter_mut() {
    let mut inferred = Vec::new();
    for input in &target.inputs {
      if let Some(producer) = producers.get(input)
        && producer != &target.id
        && !target.dependencies.contains(producer)
        && !inferred.contains(producer)
      {
        debug!(target = %target.id, dependency = %producer, file = %input.display(), "inferred dependency");
        inferred.push(producer.clone());
      }
    }
    target.dependencies.extend(inferred);
  }
}
