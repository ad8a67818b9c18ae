//! Build planning.
//!
//! Expands a dirty set to every target downstream of it, optionally restricts
//! the result to the closure of requested targets, and orders it so each
//! target follows all of its dependencies. Ties are broken by declaration
//! order, which makes the plan deterministic for a given graph.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tracing::debug;

use crate::graph::{Graph, GraphError};
use crate::staleness::DirtySet;

/// Ordered list of targets to execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Plan {
  order: Vec<String>,
}

impl Plan {
  pub fn ids(&self) -> &[String] {
    &self.order
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.order.iter().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  pub fn contains(&self, id: &str) -> bool {
    self.order.iter().any(|t| t == id)
  }

  /// Index of `id` in the plan.
  pub fn position(&self, id: &str) -> Option<usize> {
    self.order.iter().position(|t| t == id)
  }
}

/// Produce the execution plan for `dirty`.
///
/// Every target reachable downstream of a dirty target is included. When
/// `only` is given, the plan is intersected with the listed targets and
/// everything they transitively depend on.
///
/// # Errors
///
/// `UnknownTarget` if `dirty` or `only` names a target not in the graph.
pub fn plan(graph: &Graph, dirty: &DirtySet, only: Option<&[String]>) -> Result<Plan, GraphError> {
  let mut members: HashSet<NodeIndex> = HashSet::new();
  let mut queue: VecDeque<NodeIndex> = VecDeque::new();

  for id in dirty.ids() {
    let idx = graph.node(id).ok_or_else(|| GraphError::UnknownTarget(id.to_string()))?;
    if members.insert(idx) {
      queue.push_back(idx);
    }
  }

  while let Some(idx) = queue.pop_front() {
    for dependent in graph.dependent_indices(idx) {
      if members.insert(dependent) {
        queue.push_back(dependent);
      }
    }
  }

  if let Some(only) = only {
    let closure = dependency_closure(graph, only)?;
    members.retain(|idx| closure.contains(idx));
  }

  let order = linearize(graph, &members)?;
  debug!(dirty = dirty.len(), planned = order.len(), "planned build");

  Ok(Plan {
    order: order.into_iter().map(|idx| graph.target_at(idx).id.clone()).collect(),
  })
}

/// The listed targets plus everything they transitively depend on.
fn dependency_closure(graph: &Graph, ids: &[String]) -> Result<HashSet<NodeIndex>, GraphError> {
  let mut closure = HashSet::new();
  let mut stack = Vec::new();

  for id in ids {
    let idx = graph.node(id).ok_or_else(|| GraphError::UnknownTarget(id.clone()))?;
    if closure.insert(idx) {
      stack.push(idx);
    }
  }

  while let Some(idx) = stack.pop() {
    for dep in graph.dependency_indices(idx) {
      if closure.insert(dep) {
        stack.push(dep);
      }
    }
  }

  Ok(closure)
}

/// Topologically order `members`, considering only edges between members.
///
/// Kahn's algorithm over a min-heap of declaration indices: among the ready
/// targets the one declared first always goes next.
pub(crate) fn linearize(graph: &Graph, members: &HashSet<NodeIndex>) -> Result<Vec<NodeIndex>, GraphError> {
  let mut pending: HashMap<NodeIndex, usize> = HashMap::with_capacity(members.len());
  let mut ready = BinaryHeap::new();

  for &idx in members {
    let count = graph
      .dependency_indices(idx)
      .into_iter()
      .filter(|dep| members.contains(dep))
      .count();
    if count == 0 {
      ready.push(Reverse(idx));
    } else {
      pending.insert(idx, count);
    }
  }

  let mut order = Vec::with_capacity(members.len());
  while let Some(Reverse(idx)) = ready.pop() {
    order.push(idx);
    for dependent in graph.dependent_indices(idx) {
      if let Some(count) = pending.get_mut(&dependent) {
        *count -= 1;
        if *count == 0 {
          pending.remove(&dependent);
          ready.push(Reverse(dependent));
        }
      }
    }
  }

  // Unreachable for a constructed graph, which rejects cycles.
  if !pending.is_empty() {
    let mut cycle: Vec<NodeIndex> = pending.into_keys().collect();
    cycle.sort();
    return Err(GraphError::Cycle {
      cycle: cycle.into_iter().map(|idx| graph.target_at(idx).id.clone()).collect(),
    });
  }

  Ok(order)
}
