use braid_store::StoreError;
use braid_workflow::WorkflowError;

/// Errors raised by the job database.
#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
  /// A job reached hashing while one of its arguments was still a reference.
  #[error("argument '{slot}' of node '{node_id}' is not resolved")]
  UnresolvedArgument { node_id: String, slot: String },

  #[error("failed to encode job for hashing: {0}")]
  Encode(#[from] serde_json::Error),

  #[error(transparent)]
  Workflow(WorkflowError),

  /// The underlying store failed. Not retried.
  #[error("provenance store unavailable: {0}")]
  Store(#[from] StoreError),
}

impl From<WorkflowError> for ProvenanceError {
  fn from(err: WorkflowError) -> Self {
    match err {
      WorkflowError::UnresolvedArgument { node_id, slot } => {
        Self::UnresolvedArgument { node_id, slot }
      }
      other => Self::Workflow(other),
    }
  }
}
