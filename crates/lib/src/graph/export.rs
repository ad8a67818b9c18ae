//! Graph export for visualisation.
//!
//! Produces a plain node/edge description of a validated graph together with
//! each node's last-known [`BuildStatus`]. Renderers consume either the
//! serialised form (JSON) or the Graphviz dot text from [`GraphExport::to_dot`].

use std::collections::HashMap;
use std::fmt::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::execute::BuildStatus;

use super::Graph;

/// One node of an exported graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportNode {
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub help: Option<String>,
  pub outputs: Vec<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<BuildStatus>,
}

/// A dependency edge: `to` depends on `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportEdge {
  pub from: String,
  pub to: String,
}

/// Full node/edge set of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphExport {
  pub nodes: Vec<ExportNode>,
  pub edges: Vec<ExportEdge>,
}

impl GraphExport {
  /// Export `graph`, annotating nodes with any status found in `statuses`.
  pub fn new(graph: &Graph, statuses: &HashMap<String, BuildStatus>) -> Self {
    let nodes = graph
      .targets()
      .map(|t| ExportNode {
        id: t.id.clone(),
        help: t.help.clone(),
        outputs: t.outputs.clone(),
        status: statuses.get(&t.id).copied(),
      })
      .collect();

    let edges = graph
      .edges()
      .into_iter()
      .map(|(from, to)| ExportEdge {
        from: from.to_string(),
        to: to.to_string(),
      })
      .collect();

    Self { nodes, edges }
  }

  /// Render as a Graphviz `digraph`.
  ///
  /// Edges point from dependency to dependent. Nodes carrying a status are
  /// filled with a colour per status.
  pub fn to_dot(&self) -> String {
    let mut out = String::from("digraph sake {\n  rankdir=LR;\n  node [shape=box, style=rounded];\n");

    for node in &self.nodes {
      let _ = write!(out, "  \"{}\"", escape(&node.id));
      match node.status {
        Some(status) => {
          let _ = writeln!(
            out,
            " [label=\"{}\\n({})\", style=\"rounded,filled\", fillcolor=\"{}\"];",
            escape(&node.id),
            status,
            status_color(status)
          );
        }
        None => out.push_str(";\n"),
      }
    }

    for edge in &self.edges {
      let _ = writeln!(out, "  \"{}\" -> \"{}\";", escape(&edge.from), escape(&edge.to));
    }

    out.push_str("}\n");
    out
  }
}

fn escape(s: &str) -> String {
  s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn status_color(status: BuildStatus) -> &'static str {
  match status {
    BuildStatus::Fresh | BuildStatus::Succeeded => "palegreen",
    BuildStatus::Stale => "khaki",
    BuildStatus::Running => "lightblue",
    BuildStatus::Failed => "salmon",
    BuildStatus::Skipped => "lightgrey",
  }
}
