//! Target dependency graph.
//!
//! Targets are stored in declaration order and wired into a `petgraph`
//! directed graph with edges running from dependency to dependent, so
//! `Direction::Incoming` walks dependencies and `Direction::Outgoing` walks
//! dependents. A `Graph` can only be obtained through [`Graph::construct`],
//! which rejects duplicate identifiers, unknown dependencies, conflicting
//! outputs and cycles; everything downstream may therefore assume a DAG.

pub mod export;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

pub use export::{ExportEdge, ExportNode, GraphExport};
pub use types::{GraphError, Target};

/// A validated, acyclic target graph.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Edges run dependency -> dependent.
  graph: DiGraph<String, ()>,

  /// Targets in declaration order; `targets[i]` lives at `NodeIndex::new(i)`.
  targets: Vec<Target>,

  index: HashMap<String, NodeIndex>,
}

impl Graph {
  /// Build and validate a graph from parsed targets.
  ///
  /// # Errors
  ///
  /// - `DuplicateTarget` if two targets share an identifier
  /// - `UnknownDependency` if a dependency names no target
  /// - `ConflictingOutput` if two targets declare the same output
  /// - `Cycle` if the dependency relation is cyclic, naming one cycle
  pub fn construct(targets: Vec<Target>) -> Result<Self, GraphError> {
    let mut graph = DiGraph::with_capacity(targets.len(), 0);
    let mut index = HashMap::with_capacity(targets.len());
    let mut producers: HashMap<PathBuf, String> = HashMap::new();
    let mut targets = targets;

    for target in &mut targets {
      if index.contains_key(&target.id) {
        return Err(GraphError::DuplicateTarget(target.id.clone()));
      }
      let idx = graph.add_node(target.id.clone());
      index.insert(target.id.clone(), idx);

      let mut seen = HashSet::new();
      target.dependencies.retain(|dep| seen.insert(dep.clone()));

      for output in &target.outputs {
        if let Some(first) = producers.insert(output.clone(), target.id.clone())
          && first != target.id
        {
          return Err(GraphError::ConflictingOutput {
            path: output.clone(),
            first,
            second: target.id.clone(),
          });
        }
      }
    }

    for target in &targets {
      let dependent = index[&target.id];
      for dep in &target.dependencies {
        let Some(&dependency) = index.get(dep) else {
          return Err(GraphError::UnknownDependency {
            target: target.id.clone(),
            dependency: dep.clone(),
          });
        };
        graph.add_edge(dependency, dependent, ());
      }
    }

    let built = Self { graph, targets, index };

    if let Some(cycle) = built.find_cycle() {
      return Err(GraphError::Cycle {
        cycle: cycle.into_iter().map(|idx| built.graph[idx].clone()).collect(),
      });
    }

    debug!(
      targets = built.graph.node_count(),
      edges = built.graph.edge_count(),
      "constructed target graph"
    );

    Ok(built)
  }

  /// Depth-first search along dependency edges with an explicit stack.
  ///
  /// A node reached again while it is still on the stack closes a cycle; the
  /// stack slice from that node onward is the cycle, in dependency order.
  fn find_cycle(&self) -> Option<Vec<NodeIndex>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
      Unvisited,
      OnStack,
      Done,
    }

    struct Frame {
      node: NodeIndex,
      deps: Vec<NodeIndex>,
      next: usize,
    }

    let mut marks = vec![Mark::Unvisited; self.graph.node_count()];

    for root in self.graph.node_indices() {
      if marks[root.index()] != Mark::Unvisited {
        continue;
      }

      marks[root.index()] = Mark::OnStack;
      let mut stack = vec![Frame {
        node: root,
        deps: self.dependency_indices(root),
        next: 0,
      }];

      while let Some(frame) = stack.last_mut() {
        let next = frame.deps.get(frame.next).copied();
        frame.next += 1;

        match next {
          Some(dep) => match marks[dep.index()] {
            Mark::Unvisited => {
              marks[dep.index()] = Mark::OnStack;
              stack.push(Frame {
                node: dep,
                deps: self.dependency_indices(dep),
                next: 0,
              });
            }
            Mark::OnStack => {
              let start = stack.iter().position(|f| f.node == dep).unwrap_or(0);
              return Some(stack[start..].iter().map(|f| f.node).collect());
            }
            Mark::Done => {}
          },
          None => {
            marks[frame.node.index()] = Mark::Done;
            stack.pop();
          }
        }
      }
    }

    None
  }

  /// Number of targets.
  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  /// All targets in declaration order.
  pub fn targets(&self) -> impl Iterator<Item = &Target> {
    self.targets.iter()
  }

  /// Look up a target by identifier.
  pub fn target(&self, id: &str) -> Option<&Target> {
    self.index.get(id).map(|idx| &self.targets[idx.index()])
  }

  pub fn contains(&self, id: &str) -> bool {
    self.index.contains_key(id)
  }

  /// Declaration position of a target, used for deterministic tie-breaking.
  pub fn position(&self, id: &str) -> Option<usize> {
    self.index.get(id).map(|idx| idx.index())
  }

  /// Direct dependencies of `id`, in declaration order.
  pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Direct dependents of `id` (reverse edges), in declaration order.
  pub fn dependents_of(&self, id: &str) -> Vec<&str> {
    self.neighbors(id, Direction::Outgoing)
  }

  /// Every target `id` transitively depends on, each exactly once.
  ///
  /// The sequence is produced lazily by a depth-first walk with an explicit
  /// stack; diamond-shaped re-convergence does not repeat nodes. `id` itself
  /// is not part of the sequence. Unknown identifiers yield nothing.
  pub fn reachable_from(&self, id: &str) -> Reachable<'_> {
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    if let Some(&start) = self.index.get(id) {
      visited.insert(start);
      stack.extend(self.dependency_indices(start).into_iter().rev());
    }
    Reachable {
      graph: self,
      stack,
      visited,
    }
  }

  /// All `(dependency, dependent)` pairs, ordered by dependent then dependency
  /// declaration order.
  pub fn edges(&self) -> Vec<(&str, &str)> {
    let mut edges = Vec::with_capacity(self.graph.edge_count());
    for target in &self.targets {
      for dep in &target.dependencies {
        edges.push((dep.as_str(), target.id.as_str()));
      }
    }
    edges
  }

  fn neighbors(&self, id: &str, direction: Direction) -> Vec<&str> {
    let Some(&idx) = self.index.get(id) else {
      return Vec::new();
    };
    self
      .sorted_neighbors(idx, direction)
      .into_iter()
      .map(|n| self.graph[n].as_str())
      .collect()
  }

  fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
    let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
    neighbors.sort_unstable();
    neighbors.dedup();
    neighbors
  }

  pub(crate) fn node(&self, id: &str) -> Option<NodeIndex> {
    self.index.get(id).copied()
  }

  pub(crate) fn target_at(&self, idx: NodeIndex) -> &Target {
    &self.targets[idx.index()]
  }

  pub(crate) fn dependency_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    self.sorted_neighbors(idx, Direction::Incoming)
  }

  pub(crate) fn dependent_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    self.sorted_neighbors(idx, Direction::Outgoing)
  }

  pub(crate) fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
    self.graph.node_indices()
  }
}

/// Lazy iterator returned by [`Graph::reachable_from`].
pub struct Reachable<'g> {
  graph: &'g Graph,
  stack: Vec<NodeIndex>,
  visited: HashSet<NodeIndex>,
}

impl<'g> Iterator for Reachable<'g> {
  type Item = &'g str;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(idx) = self.stack.pop() {
      if !self.visited.insert(idx) {
        continue;
      }
      let deps = self.graph.dependency_indices(idx);
      self
        .stack
        .extend(deps.into_iter().rev().filter(|d| !self.visited.contains(d)));
      return Some(self.graph.graph[idx].as_str());
    }
    None
  }
}
