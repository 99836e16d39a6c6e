use serde::{Deserialize, Serialize};

use crate::node::NodeDef;

/// A workflow definition as written by users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDef {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workflow_id: Option<String>,
  pub name: String,
  /// Node whose result is the result of the whole workflow.
  pub root: String,
  pub nodes: Vec<NodeDef>,
}
