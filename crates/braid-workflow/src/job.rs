use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::node::{Argument, Hints, Node};

/// The unit the scheduler dispatches: a snapshot of one node whose references
/// are replaced by values as upstream results arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub node_id: String,
  pub function: String,
  pub arguments: BTreeMap<String, Argument>,
  #[serde(default)]
  pub hints: Hints,
}

impl Job {
  pub fn from_node(node: &Node) -> Self {
    Self {
      node_id: node.node_id.clone(),
      function: node.function.clone(),
      arguments: node.arguments.clone(),
      hints: node.hints.clone(),
    }
  }

  /// Fill one argument slot with a value.
  pub fn resolve(&mut self, slot: &str, value: serde_json::Value) {
    self
      .arguments
      .insert(slot.to_string(), Argument::Value(value));
  }

  /// Whether every argument is a value.
  pub fn is_concrete(&self) -> bool {
    self.arguments.values().all(|arg| arg.as_value().is_some())
  }

  /// The argument values, or the first slot still holding a reference.
  pub fn resolved_arguments(&self) -> Result<BTreeMap<String, serde_json::Value>, WorkflowError> {
    self
      .arguments
      .iter()
      .map(|(slot, arg)| match arg {
        Argument::Value(value) => Ok((slot.clone(), value.clone())),
        Argument::Ref(_) => Err(WorkflowError::UnresolvedArgument {
          node_id: self.node_id.clone(),
          slot: slot.clone(),
        }),
      })
      .collect()
  }

  /// Render the display hint, replacing `{slot}` with argument values.
  ///
  /// String values are inserted without quotes; unresolved slots are left as-is.
  pub fn display(&self) -> Option<String> {
    let template = self.hints.display.as_ref()?;
    let mut rendered = template.clone();
    for (slot, arg) in &self.arguments {
      if let Argument::Value(value) = arg {
        let text = match value {
          serde_json::Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        rendered = rendered.replace(&format!("{{{}}}", slot), &text);
      }
    }
    Some(rendered)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn add_node() -> Node {
    Node {
      node_id: "n".to_string(),
      function: "add".to_string(),
      arguments: BTreeMap::from([
        ("a".to_string(), Argument::Value(json!(1))),
        ("b".to_string(), Argument::Ref("m".to_string())),
      ]),
      hints: Hints {
        version: None,
        display: Some("{a} + {b}".to_string()),
      },
    }
  }

  #[test]
  fn test_resolution() {
    let mut job = Job::from_node(&add_node());
    assert!(!job.is_concrete());

    let err = job.resolved_arguments().unwrap_err();
    assert!(matches!(err, WorkflowError::UnresolvedArgument { slot, .. } if slot == "b"));

    job.resolve("b", json!(2));
    assert!(job.is_concrete());
    let args = job.resolved_arguments().unwrap();
    assert_eq!(args["a"], json!(1));
    assert_eq!(args["b"], json!(2));
  }

  #[test]
  fn test_display() {
    let mut job = Job::from_node(&add_node());
    assert_eq!(job.display().unwrap(), "1 + {b}");

    job.resolve("b", json!("two"));
    assert_eq!(job.display().unwrap(), "1 + two");
  }
}
