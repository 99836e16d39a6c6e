use braid_pipeline::PipelineError;
use braid_provenance::ProvenanceError;
use braid_workflow::WorkflowError;

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
  /// A job failed and the error handler chose to abort.
  #[error("node '{node_id}' failed: {message}")]
  JobFailed { node_id: String, message: String },

  #[error(transparent)]
  Provenance(#[from] ProvenanceError),

  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  #[error("pipeline error: {0}")]
  Pipeline(#[from] PipelineError),

  /// The result source ended while jobs were still outstanding.
  #[error("result source closed with {outstanding} job(s) outstanding")]
  PipelineClosed { outstanding: usize },

  /// Nothing is running and nothing is waiting, yet the root has no value.
  #[error("run stalled before node '{root}' was resolved")]
  Stalled { root: String },
}
