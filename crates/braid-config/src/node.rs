use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One deferred function call in a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDef {
  pub node_id: String,
  /// Name of the function, looked up in the worker's registry.
  pub function: String,
  #[serde(default)]
  pub arguments: BTreeMap<String, ArgumentDef>,
  /// Version hint. Changing it invalidates memoized results.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  /// Display template such as `"{a} + {b}"`, rendered for observers.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display: Option<String>,
}

/// A bound argument: either a literal JSON value or the output of another node.
///
/// ```json
/// { "x": { "value": 1 }, "y": { "ref": "other_node" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentDef {
  Value(serde_json::Value),
  Ref(String),
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_node_with_literal_and_ref() {
    let node: NodeDef = serde_json::from_value(json!({
      "node_id": "total",
      "function": "add",
      "arguments": {
        "x": { "value": 1 },
        "y": { "ref": "other" }
      },
      "version": "2"
    }))
    .unwrap();

    assert_eq!(node.arguments["x"], ArgumentDef::Value(json!(1)));
    assert_eq!(node.arguments["y"], ArgumentDef::Ref("other".to_string()));
    assert_eq!(node.version.as_deref(), Some("2"));
    assert!(node.display.is_none());
  }

  #[test]
  fn test_unknown_fields_rejected() {
    let result: Result<NodeDef, _> = serde_json::from_value(json!({
      "node_id": "a",
      "function": "add",
      "retries": 3
    }));
    assert!(result.is_err());
  }

  #[test]
  fn test_arguments_default_to_empty() {
    let node: NodeDef = serde_json::from_value(json!({
      "node_id": "a",
      "function": "now"
    }))
    .unwrap();
    assert!(node.arguments.is_empty());
  }
}
