use std::collections::{HashMap, HashSet};

use braid_config::WorkflowDef;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::node::{Hints, Node};

/// A validated workflow ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  /// Node whose result is the result of the run.
  pub root: String,
  pub nodes: HashMap<String, Node>,
}

impl Workflow {
  /// Build a workflow from its definition, checking references and cycles.
  pub fn from_def(def: WorkflowDef) -> Result<Self, WorkflowError> {
    let mut nodes = HashMap::with_capacity(def.nodes.len());

    for node_def in def.nodes {
      if nodes.contains_key(&node_def.node_id) {
        return Err(WorkflowError::DuplicateNode(node_def.node_id));
      }
      let node = Node {
        node_id: node_def.node_id.clone(),
        function: node_def.function,
        arguments: node_def
          .arguments
          .into_iter()
          .map(|(slot, arg)| (slot, arg.into()))
          .collect(),
        hints: Hints {
          version: node_def.version,
          display: node_def.display,
        },
      };
      nodes.insert(node_def.node_id, node);
    }

    let workflow = Self {
      workflow_id: def.workflow_id.unwrap_or_else(|| def.name.clone()),
      name: def.name,
      root: def.root,
      nodes,
    };
    workflow.validate()?;
    Ok(workflow)
  }

  /// Check that the root exists, every reference resolves and the graph is acyclic.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    if !self.nodes.contains_key(&self.root) {
      return Err(WorkflowError::NodeNotFound(self.root.clone()));
    }

    for node in self.nodes.values() {
      for (_, producer) in node.references() {
        if !self.nodes.contains_key(producer) {
          return Err(WorkflowError::InvalidEdge {
            from: producer.to_string(),
            to: node.node_id.clone(),
          });
        }
      }
    }

    self.graph().topological_order().map(|_| ())
  }

  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.nodes)
  }

  /// The root and every node it transitively reads from. Nodes outside this
  /// set do not contribute to the result.
  pub fn required_nodes(&self) -> HashSet<String> {
    let mut required = HashSet::new();
    let mut stack = vec![self.root.as_str()];

    while let Some(node_id) = stack.pop() {
      if !required.insert(node_id.to_string()) {
        continue;
      }
      if let Some(node) = self.nodes.get(node_id) {
        stack.extend(node.references().map(|(_, producer)| producer));
      }
    }

    required
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  /// Get the root node.
  pub fn root_node(&self) -> Option<&Node> {
    self.nodes.get(&self.root)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Argument;
  use serde_json::json;

  fn def(value: serde_json::Value) -> WorkflowDef {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn test_from_def() {
    let workflow = Workflow::from_def(def(json!({
      "name": "sum",
      "root": "b",
      "nodes": [
        { "node_id": "a", "function": "add",
          "arguments": { "x": { "value": 1 }, "y": { "value": 2 } } },
        { "node_id": "b", "function": "mul",
          "arguments": { "x": { "ref": "a" }, "y": { "value": 3 } },
          "version": "1.0" }
      ]
    })))
    .unwrap();

    assert_eq!(workflow.workflow_id, "sum");
    assert_eq!(workflow.root_node().unwrap().function, "mul");
    assert_eq!(
      workflow.get_node("b").unwrap().arguments["x"],
      Argument::Ref("a".to_string())
    );
    assert_eq!(
      workflow.get_node("b").unwrap().hints.version.as_deref(),
      Some("1.0")
    );
  }

  #[test]
  fn test_required_nodes() {
    let workflow = Workflow::from_def(def(json!({
      "name": "w", "root": "c",
      "nodes": [
        { "node_id": "a", "function": "add" },
        { "node_id": "b", "function": "add", "arguments": { "x": { "ref": "a" } } },
        { "node_id": "c", "function": "add",
          "arguments": { "x": { "ref": "b" }, "y": { "ref": "a" } } },
        { "node_id": "unused", "function": "add", "arguments": { "x": { "ref": "a" } } }
      ]
    })))
    .unwrap();

    let required = workflow.required_nodes();
    assert_eq!(required.len(), 3);
    assert!(required.contains("a") && required.contains("b") && required.contains("c"));
    assert!(!required.contains("unused"));
  }

  #[test]
  fn test_missing_root() {
    let err = Workflow::from_def(def(json!({
      "name": "w", "root": "nope",
      "nodes": [{ "node_id": "a", "function": "add" }]
    })))
    .unwrap_err();
    assert!(matches!(err, WorkflowError::NodeNotFound(id) if id == "nope"));
  }

  #[test]
  fn test_dangling_reference() {
    let err = Workflow::from_def(def(json!({
      "name": "w", "root": "a",
      "nodes": [{ "node_id": "a", "function": "add",
                  "arguments": { "x": { "ref": "ghost" } } }]
    })))
    .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidEdge { from, to } if from == "ghost" && to == "a"));
  }

  #[test]
  fn test_duplicate_node() {
    let err = Workflow::from_def(def(json!({
      "name": "w", "root": "a",
      "nodes": [
        { "node_id": "a", "function": "add" },
        { "node_id": "a", "function": "sub" }
      ]
    })))
    .unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicateNode(id) if id == "a"));
  }

  #[test]
  fn test_cycle_rejected() {
    let err = Workflow::from_def(def(json!({
      "name": "w", "root": "a",
      "nodes": [
        { "node_id": "a", "function": "add", "arguments": { "x": { "ref": "b" } } },
        { "node_id": "b", "function": "add", "arguments": { "x": { "ref": "a" } } }
      ]
    })))
    .unwrap_err();
    assert!(matches!(err, WorkflowError::Cycle(_)));
  }
}
