//! Local staleness detection.
//!
//! [`compute_dirty_set`] decides, for each target on its own, whether it must
//! be rebuilt. It does not propagate dirtiness to dependents; the scheduler
//! expands the set. Comparison is by content digest only: modification times
//! never make a target dirty and never make it clean.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::graph::{Graph, GraphError, Target};
use crate::hashstore::HashStore;
use crate::schedule;
use crate::util::hash::{ContentHash, SignatureHasher, hash_file_if_exists};

/// Caller-supplied overrides for staleness.
#[derive(Debug, Clone, Default)]
pub struct StalenessPolicy {
  /// Targets to rebuild regardless of fingerprints.
  pub force: BTreeSet<String>,

  /// Rebuild every target.
  pub force_all: bool,

  /// Unverifiable targets (no inputs, dependencies or outputs) to treat as
  /// fresh instead of always running them.
  pub assume_fresh: BTreeSet<String>,
}

/// Why a target is locally dirty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirtyReason {
  /// Forced by the caller.
  Forced,
  /// Nothing can prove it fresh: no inputs, dependencies or outputs.
  Unverifiable,
  /// A declared output has no recorded fingerprint.
  OutputNotRecorded(PathBuf),
  /// A declared output is missing from the filesystem.
  OutputMissing(PathBuf),
  /// A declared output's content differs from its recorded fingerprint.
  OutputChanged(PathBuf),
  /// The target has never been built successfully (or its last run failed).
  NeverBuilt,
  /// Commands, input files or clean upstream outputs changed.
  InputsChanged,
}

impl std::fmt::Display for DirtyReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DirtyReason::Forced => write!(f, "forced"),
      DirtyReason::Unverifiable => write!(f, "no inputs or outputs to verify"),
      DirtyReason::OutputNotRecorded(p) => write!(f, "output {} never recorded", p.display()),
      DirtyReason::OutputMissing(p) => write!(f, "output {} is missing", p.display()),
      DirtyReason::OutputChanged(p) => write!(f, "output {} changed", p.display()),
      DirtyReason::NeverBuilt => write!(f, "never built"),
      DirtyReason::InputsChanged => write!(f, "inputs changed"),
    }
  }
}

/// Targets requiring rebuild before transitive expansion, with reasons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
  reasons: BTreeMap<String, DirtyReason>,
}

impl DirtySet {
  pub fn contains(&self, id: &str) -> bool {
    self.reasons.contains_key(id)
  }

  pub fn reason(&self, id: &str) -> Option<&DirtyReason> {
    self.reasons.get(id)
  }

  pub fn len(&self) -> usize {
    self.reasons.len()
  }

  pub fn is_empty(&self) -> bool {
    self.reasons.is_empty()
  }

  /// Identifiers in sorted order.
  pub fn ids(&self) -> impl Iterator<Item = &str> {
    self.reasons.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &DirtyReason)> {
    self.reasons.iter().map(|(id, r)| (id.as_str(), r))
  }

  fn insert(&mut self, id: &str, reason: DirtyReason) {
    self.reasons.insert(id.to_string(), reason);
  }
}

/// Build a dirty set directly from identifiers, each marked `Forced`.
impl<S: Into<String>> FromIterator<S> for DirtySet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      reasons: iter.into_iter().map(|id| (id.into(), DirtyReason::Forced)).collect(),
    }
  }
}

#[derive(Debug, Error)]
pub enum StalenessError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error("failed to fingerprint {path}: {source}")]
  Fingerprint {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Memoised live digests, so each file is read at most once per pass.
#[derive(Default)]
pub(crate) struct LiveDigests {
  cache: HashMap<PathBuf, Option<ContentHash>>,
}

impl LiveDigests {
  pub(crate) fn get(&mut self, path: &Path) -> Result<Option<ContentHash>, StalenessError> {
    if let Some(hash) = self.cache.get(path) {
      return Ok(hash.clone());
    }
    let hash = hash_file_if_exists(path).map_err(|source| StalenessError::Fingerprint {
      path: path.to_path_buf(),
      source,
    })?;
    self.cache.insert(path.to_path_buf(), hash.clone());
    Ok(hash)
  }
}

/// Determine which targets are locally out of date.
///
/// A target is dirty if it is forced, unverifiable (and not assumed fresh),
/// if any declared output is unrecorded, missing or changed, if it has no
/// target fingerprint, or if its signature over commands, input files and
/// upstream outputs differs from the recorded one.
///
/// Upstream outputs of a dependency that is itself dirty are taken from the
/// store rather than the filesystem, so a change is attributed to the target
/// that produced it; the scheduler then adds the dependents.
pub fn compute_dirty_set(
  graph: &Graph,
  store: &HashStore,
  policy: &StalenessPolicy,
) -> Result<DirtySet, StalenessError> {
  for id in policy.force.iter().chain(&policy.assume_fresh) {
    if !graph.contains(id) {
      return Err(GraphError::UnknownTarget(id.clone()).into());
    }
  }

  let all: HashSet<_> = graph.node_indices().collect();
  let order = schedule::linearize(graph, &all)?;

  let mut live = LiveDigests::default();
  let mut dirty = DirtySet::default();

  for idx in order {
    let target = graph.target_at(idx);
    if let Some(reason) = local_reason(graph, target, store, policy, &dirty, &mut live)? {
      debug!(target = %target.id, %reason, "target is dirty");
      dirty.insert(&target.id, reason);
    }
  }

  info!(dirty = dirty.len(), total = graph.len(), "computed dirty set");
  Ok(dirty)
}

fn local_reason(
  graph: &Graph,
  target: &Target,
  store: &HashStore,
  policy: &StalenessPolicy,
  dirty: &DirtySet,
  live: &mut LiveDigests,
) -> Result<Option<DirtyReason>, StalenessError> {
  if policy.force_all || policy.force.contains(&target.id) {
    return Ok(Some(DirtyReason::Forced));
  }

  if target.is_unverifiable() {
    if policy.assume_fresh.contains(&target.id) {
      return Ok(None);
    }
    return Ok(Some(DirtyReason::Unverifiable));
  }

  for output in &target.outputs {
    let Some(recorded) = store.file(output) else {
      return Ok(Some(DirtyReason::OutputNotRecorded(output.clone())));
    };
    match live.get(output)? {
      None => return Ok(Some(DirtyReason::OutputMissing(output.clone()))),
      Some(digest) if !recorded.matches(&digest) => {
        return Ok(Some(DirtyReason::OutputChanged(output.clone())));
      }
      Some(_) => {}
    }
  }

  let Some(recorded) = store.target(&target.id) else {
    return Ok(Some(DirtyReason::NeverBuilt));
  };

  let signature = target_signature(graph, target, |owner, path| match owner {
    Some(dep) if dirty.contains(&dep.id) => Ok(store.file(path).map(|fp| fp.digest.clone())),
    _ => live.get(path),
  })?;

  if !recorded.matches(&signature) {
    return Ok(Some(DirtyReason::InputsChanged));
  }

  Ok(None)
}

/// Digest over a target's commands, its input files and the outputs of its
/// direct dependencies.
///
/// `digest_of(owner, path)` supplies file digests: `owner` is the dependency
/// that declares `path` as an output, or `None` for the target's own inputs.
/// A `None` digest (missing file) is hashed as a distinct marker.
pub(crate) fn target_signature<F>(graph: &Graph, target: &Target, mut digest_of: F) -> Result<ContentHash, StalenessError>
where
  F: FnMut(Option<&Target>, &Path) -> Result<Option<ContentHash>, StalenessError>,
{
  let mut hasher = SignatureHasher::new();

  for command in &target.commands {
    hasher.part("cmd", command.as_bytes());
  }

  let mut deps: Vec<&Target> = target.dependencies.iter().filter_map(|id| graph.target(id)).collect();
  deps.sort_unstable_by(|a, b| a.id.cmp(&b.id));

  // Inputs produced by a direct dependency are covered by its outputs below.
  let mut inputs: Vec<&PathBuf> = target
    .inputs
    .iter()
    .filter(|input| !deps.iter().any(|dep| dep.outputs.contains(*input)))
    .collect();
  inputs.sort();
  inputs.dedup();
  for input in inputs {
    hash_path(&mut hasher, "input", input, digest_of(None, input)?);
  }

  for dep in deps {
    hasher.part("dep", dep.id.as_bytes());
    let mut outputs: Vec<&PathBuf> = dep.outputs.iter().collect();
    outputs.sort();
    for output in outputs {
      hash_path(&mut hasher, "dep-output", output, digest_of(Some(dep), output)?);
    }
  }

  Ok(hasher.finish())
}

fn hash_path(hasher: &mut SignatureHasher, label: &str, path: &Path, digest: Option<ContentHash>) {
  hasher.part(label, path.to_string_lossy().as_bytes());
  match digest {
    Some(d) => hasher.part("digest", d.0.as_bytes()),
    None => hasher.part("missing", &[]),
  };
}
