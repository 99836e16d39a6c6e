//! Pipeline errors.

/// Errors raised by sinks and pools.
///
/// End-of-stream is never an error: sources report it by returning `None`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  /// An item was sent after the end-of-work sentinel.
  #[error("pipeline has been shut down")]
  Shutdown,

  /// Every consumer of the channel is gone.
  #[error("pipeline consumer dropped")]
  Closed,

  /// A worker task panicked or was aborted.
  #[error("worker task failed: {message}")]
  WorkerFailed { message: String },
}
