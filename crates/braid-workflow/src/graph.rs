use std::collections::{HashMap, VecDeque};

use crate::Node;
use crate::error::WorkflowError;

/// A consumer argument fed by a producer node's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
  pub node_id: String,
  pub slot: String,
}

/// Graph structure for traversal and analysis.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Edge lists: producer node_id -> consumer arguments it feeds.
  downstream: HashMap<String, Vec<Link>>,
  /// Number of referencing argument slots per node.
  dependency_counts: HashMap<String, usize>,
  /// Nodes with no references, sorted.
  entry_points: Vec<String>,
}

impl Graph {
  /// Build a graph from the argument references of the nodes.
  ///
  /// References to nodes that do not exist are recorded as-is; validation is
  /// the workflow's job.
  pub fn new(nodes: &HashMap<String, Node>) -> Self {
    let mut downstream: HashMap<String, Vec<Link>> = HashMap::new();
    let mut dependency_counts: HashMap<String, usize> = HashMap::new();

    let mut node_ids: Vec<&String> = nodes.keys().collect();
    node_ids.sort();

    for node_id in &node_ids {
      downstream.entry((*node_id).clone()).or_default();
      dependency_counts.entry((*node_id).clone()).or_default();
    }

    for node_id in &node_ids {
      let node = &nodes[*node_id];
      for (slot, producer) in node.references() {
        downstream
          .entry(producer.to_string())
          .or_default()
          .push(Link {
            node_id: (*node_id).clone(),
            slot: slot.to_string(),
          });
        *dependency_counts.entry((*node_id).clone()).or_default() += 1;
      }
    }

    let entry_points = node_ids
      .into_iter()
      .filter(|id| dependency_counts.get(*id).is_none_or(|count| *count == 0))
      .cloned()
      .collect();

    Self {
      downstream,
      dependency_counts,
      entry_points,
    }
  }

  /// Get entry points (nodes whose arguments are all literals).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get the consumer arguments fed by a node.
  pub fn downstream(&self, node_id: &str) -> &[Link] {
    self
      .downstream
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Number of argument slots of a node that reference other nodes.
  pub fn dependency_count(&self, node_id: &str) -> usize {
    self.dependency_counts.get(node_id).copied().unwrap_or(0)
  }

  /// Order nodes so every producer comes before its consumers.
  pub fn topological_order(&self) -> Result<Vec<String>, WorkflowError> {
    let mut remaining = self.dependency_counts.clone();
    let mut queue: VecDeque<String> = self.entry_points.iter().cloned().collect();
    let mut order = Vec::with_capacity(remaining.len());

    while let Some(node_id) = queue.pop_front() {
      for link in self.downstream(&node_id) {
        if let Some(count) = remaining.get_mut(&link.node_id) {
          *count -= 1;
          if *count == 0 {
            queue.push_back(link.node_id.clone());
          }
        }
      }
      order.push(node_id);
    }

    if order.len() < self.dependency_counts.len() {
      let mut stuck: Vec<&String> = remaining
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(id, _)| id)
        .collect();
      stuck.sort();
      let first = stuck.first().map(|id| (*id).clone()).unwrap_or_default();
      return Err(WorkflowError::Cycle(first));
    }

    Ok(order)
  }
}
