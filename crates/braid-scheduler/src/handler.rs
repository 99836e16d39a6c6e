//! What to do when a job fails.

use braid_workflow::Job;
use tracing::warn;

/// Decision of an [`ErrorHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorAction {
  /// Fail the run.
  Abort,
  /// Continue as if the job had returned this value. The value is not stored
  /// as the job's provenance result.
  Substitute(serde_json::Value),
}

/// Called by the scheduler for every failed job.
pub trait ErrorHandler: Send + Sync {
  fn on_error(&self, job: &Job, message: &str) -> ErrorAction;
}

/// Default handler: every failure aborts the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnError;

impl ErrorHandler for AbortOnError {
  fn on_error(&self, _job: &Job, _message: &str) -> ErrorAction {
    ErrorAction::Abort
  }
}

/// Replaces the result of every failed job with a fixed value.
#[derive(Debug, Clone, Default)]
pub struct SubstituteOnError(pub serde_json::Value);

impl ErrorHandler for SubstituteOnError {
  fn on_error(&self, job: &Job, message: &str) -> ErrorAction {
    warn!(node_id = %job.node_id, error = %message, substitute = %self.0, "job_result_substituted");
    ErrorAction::Substitute(self.0.clone())
  }
}
