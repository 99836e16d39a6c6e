//! Messages exchanged between the scheduler and its workers.

use braid_workflow::{Job, RuntimeKey};
use serde::{Deserialize, Serialize};

/// A job sent to a worker, tagged with the attempt it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
  pub key: RuntimeKey,
  pub job: Job,
}

impl JobMessage {
  pub fn new(key: RuntimeKey, job: Job) -> Self {
    Self { key, job }
  }
}

/// Status of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Ok,
  Error,
}

/// Result of running one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
  pub key: RuntimeKey,
  pub status: JobStatus,
  /// Function output. `null` when the job failed.
  #[serde(default)]
  pub result: serde_json::Value,
  /// Error message when the job failed.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl JobResult {
  pub fn ok(key: RuntimeKey, result: serde_json::Value) -> Self {
    Self {
      key,
      status: JobStatus::Ok,
      result,
      error: None,
    }
  }

  pub fn error(key: RuntimeKey, message: impl Into<String>) -> Self {
    Self {
      key,
      status: JobStatus::Error,
      result: serde_json::Value::Null,
      error: Some(message.into()),
    }
  }

  pub fn is_ok(&self) -> bool {
    self.status == JobStatus::Ok
  }
}
