//! Types for target execution.
//!
//! This module defines per-target statuses and outcomes, the run result
//! handed to the CLI, execution configuration and the executor's errors.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::graph::GraphError;
use crate::hashstore::HashStoreError;

/// Per-target, per-run status. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
  /// Up to date; not part of the plan.
  Fresh,
  /// Needs rebuilding (or, in a dry run, would be rebuilt).
  Stale,
  Running,
  Succeeded,
  Failed,
  /// Not run because a dependency failed or was skipped.
  Skipped,
}

impl std::fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      BuildStatus::Fresh => "fresh",
      BuildStatus::Stale => "stale",
      BuildStatus::Running => "running",
      BuildStatus::Succeeded => "succeeded",
      BuildStatus::Failed => "failed",
      BuildStatus::Skipped => "skipped",
    };
    f.write_str(s)
  }
}

/// Why a target did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
  /// A command exited non-zero (or was killed by a signal: `exit_code` is `None`).
  CommandFailed { command: String, exit_code: Option<i32> },

  /// A command could not be started.
  LaunchFailed { command: String, message: String },

  /// A command exceeded the configured timeout and was killed.
  TimedOut {
    command: String,
    #[serde(serialize_with = "serialize_millis")]
    after: Duration,
  },

  /// Every command succeeded but a declared output does not exist.
  MissingOutput { path: PathBuf },

  /// An output or input exists but could not be read for fingerprinting.
  Unreadable { path: PathBuf, message: String },

  /// A dependency failed or was skipped; this target never ran.
  DependencyFailed { dependency: String },

  /// Not dispatched because fail-fast stopped the run.
  Cancelled,
}

impl std::fmt::Display for FailureReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      FailureReason::CommandFailed {
        command,
        exit_code: Some(code),
      } => write!(f, "command exited with code {code}: {command}"),
      FailureReason::CommandFailed { command, exit_code: None } => {
        write!(f, "command terminated by signal: {command}")
      }
      FailureReason::LaunchFailed { command, message } => write!(f, "failed to launch '{command}': {message}"),
      FailureReason::TimedOut { command, after } => {
        write!(f, "command timed out after {}s: {command}", after.as_secs_f64())
      }
      FailureReason::MissingOutput { path } => write!(f, "declared output was not produced: {}", path.display()),
      FailureReason::Unreadable { path, message } => {
        write!(f, "could not fingerprint {}: {message}", path.display())
      }
      FailureReason::DependencyFailed { dependency } => write!(f, "dependency '{dependency}' did not succeed"),
      FailureReason::Cancelled => write!(f, "cancelled after an earlier failure"),
    }
  }
}

/// What happened to one planned target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
  pub status: BuildStatus,

  /// Exit code of the last command run, if any ran to completion.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub exit_code: Option<i32>,

  /// Wall-clock time spent running commands.
  #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
  pub duration: Duration,

  /// Captured stdout of all commands run, concatenated.
  pub stdout: String,

  /// Captured stderr of all commands run, concatenated.
  pub stderr: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub failure: Option<FailureReason>,
}

impl TargetOutcome {
  pub(crate) fn with_status(status: BuildStatus) -> Self {
    Self {
      status,
      exit_code: None,
      duration: Duration::ZERO,
      stdout: String::new(),
      stderr: String::new(),
      failure: None,
    }
  }

  pub(crate) fn failed(reason: FailureReason) -> Self {
    Self {
      failure: Some(reason),
      ..Self::with_status(BuildStatus::Failed)
    }
  }

  pub(crate) fn skipped(reason: FailureReason) -> Self {
    Self {
      failure: Some(reason),
      ..Self::with_status(BuildStatus::Skipped)
    }
  }
}

/// Overall result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
  AllSucceeded,
  PartialFailure { failed: Vec<String>, skipped: Vec<String> },
}

/// Result handed to the reporting collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
  #[serde(flatten)]
  pub status: RunStatus,

  /// Whether commands were actually run.
  pub dry_run: bool,

  /// One entry per planned target, each with exactly one terminal status
  /// (`stale` for dry runs).
  pub per_target: BTreeMap<String, TargetOutcome>,
}

impl RunResult {
  /// True when every scheduled target succeeded (vacuously for empty plans).
  pub fn is_success(&self) -> bool {
    matches!(self.status, RunStatus::AllSucceeded)
  }

  /// Identifiers whose status is `status`, sorted.
  pub fn with_status(&self, status: BuildStatus) -> Vec<&str> {
    self
      .per_target
      .iter()
      .filter(|(_, o)| o.status == status)
      .map(|(id, _)| id.as_str())
      .collect()
  }

  /// Number of targets whose commands were run.
  pub fn executed(&self) -> usize {
    self
      .per_target
      .values()
      .filter(|o| matches!(o.status, BuildStatus::Succeeded | BuildStatus::Failed))
      .count()
  }

  pub(crate) fn from_outcomes(per_target: BTreeMap<String, TargetOutcome>, dry_run: bool) -> Self {
    let failed: Vec<String> = per_target
      .iter()
      .filter(|(_, o)| o.status == BuildStatus::Failed)
      .map(|(id, _)| id.clone())
      .collect();
    let skipped: Vec<String> = per_target
      .iter()
      .filter(|(_, o)| o.status == BuildStatus::Skipped)
      .map(|(id, _)| id.clone())
      .collect();

    let status = if failed.is_empty() && skipped.is_empty() {
      RunStatus::AllSucceeded
    } else {
      RunStatus::PartialFailure { failed, skipped }
    };

    Self {
      status,
      dry_run,
      per_target,
    }
  }
}

/// Configuration for target execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of targets running at once.
  pub parallelism: usize,

  /// Per-command timeout. `None` waits forever.
  pub timeout: Option<Duration>,

  /// Shell to run commands with. `None` uses `/bin/sh` (Unix) or PowerShell (Windows).
  pub shell: Option<String>,

  /// Plan only; run nothing and write nothing.
  pub dry_run: bool,

  /// Stop dispatching new targets after the first failure.
  pub fail_fast: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      timeout: None,
      shell: None,
      dry_run: false,
      fail_fast: false,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Errors that abort a run.
///
/// Per-target failures are not errors; they are reported in [`RunResult`].
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The HashStore could not be written; build state integrity is lost.
  #[error("persistence error: {0}")]
  Persistence(#[from] HashStoreError),

  /// The plan does not fit the graph.
  #[error("graph error: {0}")]
  Graph(#[from] GraphError),

  /// A worker task panicked or was cancelled.
  #[error("worker task failed: {0}")]
  Worker(String),
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(duration.as_millis() as u64)
}
