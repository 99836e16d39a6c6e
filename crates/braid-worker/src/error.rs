//! Worker errors.
//!
//! A failing user function is not an error here: it is reported as a
//! [`JobResult`](crate::JobResult) with [`JobStatus::Error`](crate::JobStatus).

/// Errors raised while setting up or talking to a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
  /// The worker process could not be started.
  #[error("failed to start worker '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// A standard stream of the worker process was not captured.
  #[error("worker process has no {stream}")]
  MissingStream { stream: &'static str },

  #[error("worker i/o failed: {0}")]
  Io(#[from] std::io::Error),

  /// A line could not be decoded or encoded.
  #[error("malformed worker message: {message}")]
  Protocol { message: String },

  /// The initialisation job did not succeed.
  #[error("worker initialisation failed: {message}")]
  InitFailed { message: String },
}

impl From<serde_json::Error> for WorkerError {
  fn from(err: serde_json::Error) -> Self {
    Self::Protocol {
      message: err.to_string(),
    }
  }
}
