use std::collections::BTreeMap;

use braid_config::ArgumentDef;
use serde::{Deserialize, Serialize};

/// A bound argument of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Argument {
  /// A concrete value.
  Value(serde_json::Value),
  /// The output of another node, by node id.
  Ref(String),
}

impl Argument {
  pub fn as_value(&self) -> Option<&serde_json::Value> {
    match self {
      Argument::Value(value) => Some(value),
      Argument::Ref(_) => None,
    }
  }
}

impl From<ArgumentDef> for Argument {
  fn from(def: ArgumentDef) -> Self {
    match def {
      ArgumentDef::Value(value) => Argument::Value(value),
      ArgumentDef::Ref(node_id) => Argument::Ref(node_id),
    }
  }
}

/// Optional scheduling hints attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hints {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display: Option<String>,
}

/// One deferred function call. Immutable once the workflow is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub node_id: String,
  pub function: String,
  pub arguments: BTreeMap<String, Argument>,
  #[serde(default)]
  pub hints: Hints,
}

impl Node {
  /// Ids of the nodes this node reads from, one entry per referencing slot.
  pub fn references(&self) -> impl Iterator<Item = (&str, &str)> {
    self.arguments.iter().filter_map(|(slot, arg)| match arg {
      Argument::Ref(node_id) => Some((slot.as_str(), node_id.as_str())),
      Argument::Value(_) => None,
    })
  }
}
