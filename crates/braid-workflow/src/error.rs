use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("argument references unknown node: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("workflow contains a cycle through node '{0}'")]
  Cycle(String),

  #[error("argument '{slot}' of node '{node_id}' is still unresolved")]
  UnresolvedArgument { node_id: String, slot: String },
}
