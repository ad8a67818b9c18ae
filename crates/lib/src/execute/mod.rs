//! Target execution.
//!
//! [`run`] walks a [`Plan`] with a bounded pool of workers. A target becomes
//! ready when every planned dependency has succeeded; targets whose
//! dependencies lie outside the plan are ready immediately. Worker tasks only
//! run commands. Every HashStore update happens on the dispatching task,
//! which makes it the single writer, and a target's fingerprints are saved
//! before any of its dependents is dispatched.
//!
//! A target's signature is taken when it is dispatched, so an input edited
//! while its commands run is seen as changed on the next invocation.

pub mod build;
pub mod runner;
pub mod types;

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::graph::{Graph, GraphError, Target};
use crate::hashstore::HashStore;
use crate::schedule::Plan;
use crate::staleness::{LiveDigests, StalenessError, target_signature};
use crate::util::hash::{ContentHash, hash_file_if_exists};

pub use build::{
  BuildError, BuildOptions, BuildReport, CleanReport, StatusReport, build, build_with, clean, load_graph, status,
};
pub use runner::{CommandOutput, CommandRequest, CommandRunner, RunnerError, ShellRunner};
pub use types::{BuildStatus, ExecuteConfig, ExecuteError, FailureReason, RunResult, RunStatus, TargetOutcome};

/// Execute `plan` against `graph`, recording fingerprints in `store`.
///
/// Commands run with `cwd` as their working directory. Per-target failures
/// are reported in the result; only an invalid plan or a HashStore that
/// cannot be saved aborts the run with `Err`.
pub async fn run<R: CommandRunner>(
  plan: &Plan,
  graph: &Graph,
  store: &mut HashStore,
  runner: Arc<R>,
  cwd: &Path,
  config: &ExecuteConfig,
) -> Result<RunResult, ExecuteError> {
  for id in plan.iter() {
    if !graph.contains(id) {
      return Err(GraphError::UnknownTarget(id.to_string()).into());
    }
  }

  if config.dry_run {
    info!(planned = plan.len(), "dry run, nothing executed");
    let per_target = plan
      .iter()
      .map(|id| (id.to_string(), TargetOutcome::with_status(BuildStatus::Stale)))
      .collect();
    return Ok(RunResult::from_outcomes(per_target, true));
  }

  info!(planned = plan.len(), parallelism = config.parallelism, "starting execution");

  let mut state = RunState::new(plan, graph);
  let mut join_set: JoinSet<(usize, TargetOutcome)> = JoinSet::new();
  let mut signatures: HashMap<usize, ContentHash> = HashMap::new();
  let parallelism = config.parallelism.max(1);
  let mut running = 0usize;
  let mut halted = false;

  loop {
    while !halted && running < parallelism {
      let Some(Reverse(pos)) = state.ready.pop() else {
        break;
      };
      let target = state.target(pos);
      running += 1;

      match dispatch_signature(graph, target)? {
        Ok(signature) => {
          signatures.insert(pos, signature);
        }
        Err(reason) => {
          join_set.spawn(async move { (pos, TargetOutcome::failed(reason)) });
          continue;
        }
      }
      info!(target = %target.id, status = %BuildStatus::Running, "dispatching target");

      let runner = Arc::clone(&runner);
      let commands = target.commands.clone();
      let request = CommandRequest {
        command: String::new(),
        cwd: cwd.to_path_buf(),
        shell: config.shell.clone(),
        timeout: config.timeout,
      };
      join_set.spawn(async move { (pos, run_target(runner, commands, request).await) });
    }

    let Some(joined) = join_set.join_next().await else {
      break;
    };
    running -= 1;

    let (pos, mut outcome) = joined.map_err(|e| {
      error!(error = %e, "target task panicked");
      ExecuteError::Worker(e.to_string())
    })?;
    let target = state.target(pos);
    let signature = signatures.remove(&pos);

    if outcome.status == BuildStatus::Succeeded
      && let Some(signature) = signature
      && let Some(reason) = record_success(target, signature, store)?
    {
      outcome.status = BuildStatus::Failed;
      outcome.failure = Some(reason);
    }

    if outcome.status == BuildStatus::Succeeded {
      info!(target = %target.id, duration = ?outcome.duration, "target succeeded");
      state.complete(pos, outcome);
    } else {
      warn!(
        target = %target.id,
        reason = %outcome.failure.as_ref().map(ToString::to_string).unwrap_or_default(),
        "target failed"
      );
      let affected = state.fail(pos, outcome);
      invalidate(store, &affected)?;
      if config.fail_fast {
        halted = true;
      }
    }
  }

  if halted {
    let cancelled = state.cancel_remaining();
    if !cancelled.is_empty() {
      warn!(count = cancelled.len(), "fail-fast: remaining targets not dispatched");
      invalidate(store, &cancelled)?;
    }
  }

  let result = RunResult::from_outcomes(state.outcomes, false);
  info!(
    executed = result.executed(),
    success = result.is_success(),
    "execution finished"
  );
  Ok(result)
}

/// Bookkeeping for one run: the ready queue, unresolved-dependency counts and
/// terminal outcomes, all indexed by plan position.
struct RunState<'a> {
  graph: &'a Graph,
  plan: &'a Plan,
  position: HashMap<&'a str, usize>,
  pending: Vec<usize>,
  ready: BinaryHeap<Reverse<usize>>,
  outcomes: BTreeMap<String, TargetOutcome>,
}

impl<'a> RunState<'a> {
  fn new(plan: &'a Plan, graph: &'a Graph) -> Self {
    let position: HashMap<&str, usize> = plan.iter().enumerate().map(|(pos, id)| (id, pos)).collect();

    let pending: Vec<usize> = plan
      .iter()
      .map(|id| {
        graph
          .dependencies_of(id)
          .into_iter()
          .filter(|dep| position.contains_key(dep))
          .count()
      })
      .collect();

    let ready = pending
      .iter()
      .enumerate()
      .filter(|&(_, &count)| count == 0)
      .map(|(pos, _)| Reverse(pos))
      .collect();

    Self {
      graph,
      plan,
      position,
      pending,
      ready,
      outcomes: BTreeMap::new(),
    }
  }

  fn target(&self, pos: usize) -> &'a Target {
    let id = &self.plan.ids()[pos];
    // Plan ids are checked against the graph before the run starts.
    self.graph.target(id).unwrap_or_else(|| unreachable!("planned target {id} not in graph"))
  }

  fn planned_dependents(&self, pos: usize) -> Vec<usize> {
    self
      .graph
      .dependents_of(&self.plan.ids()[pos])
      .into_iter()
      .filter_map(|id| self.position.get(id).copied())
      .collect()
  }

  /// Record a success and release dependents whose last dependency it was.
  fn complete(&mut self, pos: usize, outcome: TargetOutcome) {
    let plan = self.plan;
    for dependent in self.planned_dependents(pos) {
      self.pending[dependent] -= 1;
      if self.pending[dependent] == 0 {
        self.ready.push(Reverse(dependent));
      }
    }
    self.outcomes.insert(plan.ids()[pos].clone(), outcome);
  }

  /// Record a failure and skip every planned transitive dependent.
  ///
  /// Skipped targets never reach a zero count, so they are never dispatched.
  /// Returns the failed target followed by the skipped ones.
  fn fail(&mut self, pos: usize, outcome: TargetOutcome) -> Vec<String> {
    let plan = self.plan;
    let failed_id = plan.ids()[pos].clone();
    self.outcomes.insert(failed_id.clone(), outcome);
    let mut affected = vec![failed_id];

    let mut queue = VecDeque::from([pos]);
    while let Some(upstream) = queue.pop_front() {
      for dependent in self.planned_dependents(upstream) {
        let id = &plan.ids()[dependent];
        if self.outcomes.contains_key(id) {
          continue;
        }
        let dependency = plan.ids()[upstream].clone();
        debug!(target = %id, %dependency, "skipping target");
        self
          .outcomes
          .insert(id.clone(), TargetOutcome::skipped(FailureReason::DependencyFailed { dependency }));
        affected.push(id.clone());
        queue.push_back(dependent);
      }
    }

    affected
  }

  /// Skip every planned target without an outcome (fail-fast).
  fn cancel_remaining(&mut self) -> Vec<String> {
    let plan = self.plan;
    let mut cancelled = Vec::new();
    for id in plan.iter() {
      if !self.outcomes.contains_key(id) {
        self
          .outcomes
          .insert(id.to_string(), TargetOutcome::skipped(FailureReason::Cancelled));
        cancelled.push(id.to_string());
      }
    }
    self.ready.clear();
    cancelled
  }
}

/// Run a target's commands in order, stopping at the first that fails.
async fn run_target<R: CommandRunner>(runner: Arc<R>, commands: Vec<String>, mut request: CommandRequest) -> TargetOutcome {
  let start = Instant::now();
  let mut outcome = TargetOutcome::with_status(BuildStatus::Succeeded);

  for command in commands {
    request.command = command;
    match runner.run(&request).await {
      Ok(output) => {
        outcome.exit_code = output.exit_code;
        outcome.stdout.push_str(&output.stdout);
        outcome.stderr.push_str(&output.stderr);
        if !output.success() {
          outcome.status = BuildStatus::Failed;
          outcome.failure = Some(FailureReason::CommandFailed {
            command: request.command,
            exit_code: output.exit_code,
          });
          break;
        }
      }
      Err(RunnerError::Launch(e)) => {
        outcome.status = BuildStatus::Failed;
        outcome.failure = Some(FailureReason::LaunchFailed {
          command: request.command,
          message: e.to_string(),
        });
        break;
      }
      Err(RunnerError::TimedOut { after, stdout, stderr }) => {
        outcome.stdout.push_str(&stdout);
        outcome.stderr.push_str(&stderr);
        outcome.status = BuildStatus::Failed;
        outcome.failure = Some(FailureReason::TimedOut {
          command: request.command,
          after,
        });
        break;
      }
    }
  }

  outcome.duration = start.elapsed();
  outcome
}

/// Signature over the commands, inputs and dependency outputs a target is
/// about to consume. An unreadable file fails the target before it runs.
fn dispatch_signature(graph: &Graph, target: &Target) -> Result<Result<ContentHash, FailureReason>, ExecuteError> {
  let mut live = LiveDigests::default();
  match target_signature(graph, target, |_, path| live.get(path)) {
    Ok(signature) => Ok(Ok(signature)),
    Err(StalenessError::Fingerprint { path, source }) => Ok(Err(FailureReason::Unreadable {
      path,
      message: source.to_string(),
    })),
    Err(StalenessError::Graph(e)) => Err(e.into()),
  }
}

/// Fingerprint a succeeded target's outputs and persist them together with
/// the signature taken at dispatch.
///
/// Returns `Some(reason)` if the target must be failed instead: a declared
/// output is missing or cannot be read. Nothing is recorded then.
fn record_success(
  target: &Target,
  signature: ContentHash,
  store: &mut HashStore,
) -> Result<Option<FailureReason>, ExecuteError> {
  let mut outputs: Vec<(PathBuf, _)> = Vec::with_capacity(target.outputs.len());
  for output in &target.outputs {
    match hash_file_if_exists(output) {
      Ok(Some(digest)) => outputs.push((output.clone(), digest)),
      Ok(None) => return Ok(Some(FailureReason::MissingOutput { path: output.clone() })),
      Err(e) => {
        return Ok(Some(FailureReason::Unreadable {
          path: output.clone(),
          message: e.to_string(),
        }));
      }
    }
  }

  for (path, digest) in outputs {
    debug!(target = %target.id, path = %path.display(), digest = %digest.short(), "recording output");
    store.record_file(path, digest);
  }
  store.record_target(&target.id, signature);
  store.save()?;
  Ok(None)
}

/// Remove target fingerprints so the targets are dirty next time.
fn invalidate(store: &mut HashStore, ids: &[String]) -> Result<(), ExecuteError> {
  let mut changed = false;
  for id in ids {
    changed |= store.forget_target(id);
  }
  if changed {
    store.save()?;
  }
  Ok(())
}
