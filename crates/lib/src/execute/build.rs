//! Whole-invocation entry points.
//!
//! Each function loads the workflow file, validates the graph and takes the
//! state lock before touching the HashStore. Structural and persistence
//! errors are returned before any command runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::graph::{Graph, GraphError};
use crate::hashstore::{HashStore, HashStoreError, LockMode, StateLock, StateLockError};
use crate::sakefile::{self, SakefileError};
use crate::schedule::{self, Plan};
use crate::staleness::{DirtySet, StalenessError, StalenessPolicy, compute_dirty_set};
use crate::util::paths;

use super::runner::{CommandRunner, ShellRunner};
use super::types::{BuildStatus, ExecuteConfig, ExecuteError, RunResult};

/// Options for one invocation.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
  pub execute: ExecuteConfig,

  /// Targets to rebuild regardless of fingerprints.
  pub force: BTreeSet<String>,

  /// Rebuild everything.
  pub force_all: bool,

  /// Targets without inputs, dependencies or outputs to treat as fresh.
  pub assume_fresh: BTreeSet<String>,

  /// Restrict the plan to these targets and their dependencies.
  pub only: Option<Vec<String>>,

  /// Macro overrides (`-D NAME=value`).
  pub macros: BTreeMap<String, String>,

  /// State directory override. Defaults to [`paths::state_dir`].
  pub state_dir: Option<PathBuf>,
}

impl BuildOptions {
  fn policy(&self) -> StalenessPolicy {
    StalenessPolicy {
      force: self.force.clone(),
      force_all: self.force_all,
      assume_fresh: self.assume_fresh.clone(),
    }
  }

  fn state_dir_for(&self, base_dir: &Path) -> PathBuf {
    self.state_dir.clone().unwrap_or_else(|| paths::state_dir(base_dir))
  }
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Sakefile(#[from] SakefileError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Staleness(#[from] StalenessError),

  #[error(transparent)]
  Store(#[from] HashStoreError),

  #[error(transparent)]
  Lock(#[from] StateLockError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),

  #[error("failed to remove {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Staleness and plan for a workflow, without running anything.
#[derive(Debug)]
pub struct StatusReport {
  pub graph: Graph,
  pub base_dir: PathBuf,
  pub dirty: DirtySet,
  pub plan: Plan,
}

impl StatusReport {
  /// `Stale` for planned targets, `Fresh` for everything else.
  pub fn statuses(&self) -> HashMap<String, BuildStatus> {
    self
      .graph
      .targets()
      .map(|t| {
        let status = if self.plan.contains(&t.id) {
          BuildStatus::Stale
        } else {
          BuildStatus::Fresh
        };
        (t.id.clone(), status)
      })
      .collect()
  }
}

/// Everything a build invocation produced.
#[derive(Debug)]
pub struct BuildReport {
  pub graph: Graph,
  pub base_dir: PathBuf,
  pub dirty: DirtySet,
  pub plan: Plan,
  pub run: RunResult,
}

impl BuildReport {
  /// Final status of every target: its run outcome if planned, else `Fresh`.
  pub fn statuses(&self) -> HashMap<String, BuildStatus> {
    self
      .graph
      .targets()
      .map(|t| {
        let status = self.run.per_target.get(&t.id).map_or(BuildStatus::Fresh, |o| o.status);
        (t.id.clone(), status)
      })
      .collect()
  }
}

/// What `clean` removed.
#[derive(Debug, Default)]
pub struct CleanReport {
  pub removed: Vec<PathBuf>,
  pub forgotten: Vec<String>,
}

/// Build the workflow at `workflow` with the shell runner.
pub async fn build(workflow: &Path, options: &BuildOptions) -> Result<BuildReport, BuildError> {
  build_with(workflow, options, Arc::new(ShellRunner)).await
}

/// Build the workflow at `workflow`, running commands through `runner`.
pub async fn build_with<R: CommandRunner>(
  workflow: &Path,
  options: &BuildOptions,
  runner: Arc<R>,
) -> Result<BuildReport, BuildError> {
  let (graph, base_dir) = load_graph(workflow, options)?;
  let state_dir = options.state_dir_for(&base_dir);

  // A dry run writes nothing, so a shared lock suffices.
  let mode = if options.execute.dry_run {
    LockMode::Shared
  } else {
    LockMode::Exclusive
  };
  let _lock = StateLock::acquire(&state_dir, mode, "build")?;
  let mut store = HashStore::load(&HashStore::path_in(&state_dir))?;

  let dirty = compute_dirty_set(&graph, &store, &options.policy())?;
  let plan = schedule::plan(&graph, &dirty, options.only.as_deref())?;
  info!(dirty = dirty.len(), planned = plan.len(), "build planned");

  let run = super::run(&plan, &graph, &mut store, runner, &base_dir, &options.execute).await?;

  Ok(BuildReport {
    graph,
    base_dir,
    dirty,
    plan,
    run,
  })
}

/// Compute staleness and the plan without executing.
pub fn status(workflow: &Path, options: &BuildOptions) -> Result<StatusReport, BuildError> {
  let (graph, base_dir) = load_graph(workflow, options)?;
  let state_dir = options.state_dir_for(&base_dir);

  let _lock = StateLock::acquire(&state_dir, LockMode::Shared, "status")?;
  let store = HashStore::load(&HashStore::path_in(&state_dir))?;

  let dirty = compute_dirty_set(&graph, &store, &options.policy())?;
  let plan = schedule::plan(&graph, &dirty, options.only.as_deref())?;

  Ok(StatusReport {
    graph,
    base_dir,
    dirty,
    plan,
  })
}

/// Delete the declared outputs of the selected targets (all when `only` is
/// unset) and forget their fingerprints.
pub fn clean(workflow: &Path, options: &BuildOptions) -> Result<CleanReport, BuildError> {
  let (graph, base_dir) = load_graph(workflow, options)?;
  let state_dir = options.state_dir_for(&base_dir);

  let selected: Vec<&str> = match &options.only {
    Some(ids) => {
      for id in ids {
        if !graph.contains(id) {
          return Err(GraphError::UnknownTarget(id.clone()).into());
        }
      }
      ids.iter().map(String::as_str).collect()
    }
    None => graph.targets().map(|t| t.id.as_str()).collect(),
  };

  let _lock = StateLock::acquire(&state_dir, LockMode::Exclusive, "clean")?;
  let mut store = HashStore::load(&HashStore::path_in(&state_dir))?;
  let mut report = CleanReport::default();

  for id in selected {
    let Some(target) = graph.target(id) else {
      continue;
    };
    for output in &target.outputs {
      match std::fs::remove_file(output) {
        Ok(()) => {
          debug!(path = %output.display(), "removed output");
          report.removed.push(output.clone());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
          return Err(BuildError::Remove {
            path: output.clone(),
            source,
          });
        }
      }
      store.forget_file(output);
    }
    if store.forget_target(id) {
      report.forgotten.push(id.to_string());
    }
  }

  store.save()?;
  info!(removed = report.removed.len(), "clean complete");
  Ok(report)
}

/// Parse the workflow file and validate its graph.
pub fn load_graph(workflow: &Path, options: &BuildOptions) -> Result<(Graph, PathBuf), BuildError> {
  let sakefile = sakefile::load(workflow, &options.macros)?;
  let graph = Graph::construct(sakefile.targets)?;
  debug!(targets = graph.len(), base_dir = %sakefile.base_dir.display(), "loaded workflow");
  Ok((graph, sakefile.base_dir))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::execute::RunStatus;
  use crate::util::testutil::{RecordingRunner, write_file};
  use tempfile::TempDir;

  const ABC: &str = r#"
A:
  formula: echo a > a.txt
  output: [a.txt]
B:
  dependencies: [a.txt]
  formula: cat a.txt > b.txt
  output: [b.txt]
C:
  dependencies: [a.txt]
  formula: cat a.txt > c.txt
  output: [c.txt]
"#;

  fn workspace(sakefile: &str) -> (TempDir, PathBuf, BuildOptions) {
    let temp = TempDir::new().unwrap();
    let file = write_file(temp.path(), "Sakefile.yaml", sakefile);
    let options = BuildOptions {
      state_dir: Some(temp.path().join("state")),
      execute: ExecuteConfig {
        parallelism: 2,
        ..Default::default()
      },
      ..Default::default()
    };
    (temp, file, options)
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn second_build_does_nothing() {
    let (_temp, file, options) = workspace(ABC);

    let first = build(&file, &options).await.unwrap();
    assert_eq!(first.plan.ids(), ["A", "B", "C"]);
    assert!(first.run.is_success());

    let second = build(&file, &options).await.unwrap();
    assert!(second.dirty.is_empty());
    assert!(second.plan.is_empty());
    assert_eq!(second.run.status, RunStatus::AllSucceeded);
    assert_eq!(second.run.executed(), 0);
    assert!(second.statuses().values().all(|s| *s == BuildStatus::Fresh));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn modified_output_rebuilds_downstream() {
    let (temp, file, options) = workspace(ABC);
    build(&file, &options).await.unwrap();

    std::fs::write(temp.path().join("a.txt"), "edited by hand\n").unwrap();

    let report = status(&file, &options).unwrap();
    assert_eq!(report.dirty.ids().collect::<Vec<_>>(), ["A"]);
    assert_eq!(report.plan.ids(), ["A", "B", "C"]);
    assert_eq!(report.statuses()["B"], BuildStatus::Stale);
  }

  #[tokio::test]
  async fn only_limits_build_to_closure() {
    let (_temp, file, options) = workspace("A:\n  formula: a\nB:\n  dependencies: [A]\n  formula: b\nC:\n  formula: c\n");
    let options = BuildOptions {
      only: Some(vec!["B".into()]),
      ..options
    };
    let runner = Arc::new(RecordingRunner::new());

    let report = build_with(&file, &options, Arc::clone(&runner)).await.unwrap();
    assert_eq!(report.plan.ids(), ["A", "B"]);
    assert_eq!(runner.invoked(), vec!["a", "b"]);
  }

  #[tokio::test]
  async fn unknown_forced_target_fails_before_running() {
    let (_temp, file, options) = workspace("A:\n  formula: a\n");
    let options = BuildOptions {
      force: BTreeSet::from(["nope".to_string()]),
      ..options
    };
    let runner = Arc::new(RecordingRunner::new());

    let err = build_with(&file, &options, Arc::clone(&runner)).await.unwrap_err();
    assert!(matches!(
      err,
      BuildError::Staleness(StalenessError::Graph(GraphError::UnknownTarget(_)))
    ));
    assert!(runner.invoked().is_empty());
  }

  #[tokio::test]
  async fn cycle_fails_before_running() {
    let (_temp, file, options) = workspace("A:\n  dependencies: [B]\n  formula: a\nB:\n  dependencies: [A]\n  formula: b\n");
    let runner = Arc::new(RecordingRunner::new());

    let err = build_with(&file, &options, Arc::clone(&runner)).await.unwrap_err();
    assert!(matches!(err, BuildError::Graph(GraphError::Cycle { .. })));
    assert!(runner.invoked().is_empty());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn clean_removes_outputs_and_fingerprints() {
    let (temp, file, options) = workspace(ABC);
    build(&file, &options).await.unwrap();

    let report = clean(&file, &options).unwrap();
    assert_eq!(report.removed.len(), 3);
    assert!(!temp.path().join("a.txt").exists());

    let status = status(&file, &options).unwrap();
    assert_eq!(status.dirty.len(), 3);
  }

  #[tokio::test]
  async fn dry_run_leaves_store_empty() {
    let (temp, file, options) = workspace("A:\n  formula: a\n  output: [a.txt]\n");
    let options = BuildOptions {
      execute: ExecuteConfig {
        dry_run: true,
        ..options.execute.clone()
      },
      ..options
    };
    let runner = Arc::new(RecordingRunner::new());

    let report = build_with(&file, &options, Arc::clone(&runner)).await.unwrap();
    assert!(report.run.dry_run);
    assert_eq!(report.statuses()["A"], BuildStatus::Stale);
    assert!(runner.invoked().is_empty());
    assert!(!temp.path().join("state").join("hashstore.json").exists());
  }
}
