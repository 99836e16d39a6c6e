//! In-process job execution.

use std::sync::Arc;

use async_trait::async_trait;
use braid_pipeline::Worker;
use braid_workflow::{Job, RuntimeKey};
use tracing::{error, info, instrument};

use crate::registry::FunctionRegistry;
use crate::result::{JobMessage, JobResult};

/// Runs jobs against a [`FunctionRegistry`].
///
/// Functions are called on the blocking thread pool so a slow function does
/// not hold up the async workers around it.
#[derive(Debug, Clone)]
pub struct LocalWorker {
  registry: Arc<FunctionRegistry>,
}

impl LocalWorker {
  pub fn new(registry: Arc<FunctionRegistry>) -> Self {
    Self { registry }
  }

  pub fn builtin() -> Self {
    Self::new(Arc::new(FunctionRegistry::builtin()))
  }

  pub fn registry(&self) -> &FunctionRegistry {
    &self.registry
  }

  /// Run one job. Failures of any kind are reported in the result.
  #[instrument(
    name = "run_job",
    skip(self, key, job),
    fields(
      runtime_key = %key,
      node_id = %job.node_id,
      function = %job.function,
    )
  )]
  pub async fn run_job(&self, key: RuntimeKey, job: Job) -> JobResult {
    let result = self.run_inner(key, &job).await;

    match &result.error {
      None => info!(result = %result.result, "job_completed"),
      Some(message) => error!(error = %message, "job_failed"),
    }

    result
  }

  async fn run_inner(&self, key: RuntimeKey, job: &Job) -> JobResult {
    let arguments = match job.resolved_arguments() {
      Ok(arguments) => arguments,
      Err(e) => return JobResult::error(key, e.to_string()),
    };

    let Some(function) = self.registry.get(&job.function) else {
      return JobResult::error(key, format!("unknown function '{}'", job.function));
    };

    match tokio::task::spawn_blocking(move || function(&arguments)).await {
      Ok(Ok(value)) => JobResult::ok(key, value),
      Ok(Err(message)) => JobResult::error(key, message),
      Err(e) if e.is_panic() => JobResult::error(key, format!("function '{}' panicked", job.function)),
      Err(e) => JobResult::error(key, e.to_string()),
    }
  }
}

#[async_trait]
impl Worker<JobMessage, JobResult> for LocalWorker {
  async fn work(&self, message: JobMessage) -> JobResult {
    self.run_job(message.key, message.job).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::result::JobStatus;
  use braid_workflow::{Argument, Hints};
  use serde_json::json;
  use std::collections::BTreeMap;

  fn job(function: &str, arguments: Vec<(&str, Argument)>) -> Job {
    Job {
      node_id: "n".to_string(),
      function: function.to_string(),
      arguments: arguments
        .into_iter()
        .map(|(slot, arg)| (slot.to_string(), arg))
        .collect::<BTreeMap<_, _>>(),
      hints: Hints::default(),
    }
  }

  fn worker() -> LocalWorker {
    let mut registry = FunctionRegistry::builtin();
    registry.register("panic", |_| panic!("boom"));
    LocalWorker::new(Arc::new(registry))
  }

  #[tokio::test]
  async fn test_run_job() {
    let key = RuntimeKey::new();
    let job = job(
      "add",
      vec![
        ("x", Argument::Value(json!(1))),
        ("y", Argument::Value(json!(1))),
      ],
    );

    let result = worker().run_job(key, job).await;
    assert_eq!(result.key, key);
    assert_eq!(result.status, JobStatus::Ok);
    assert_eq!(result.result, json!(2));
    assert_eq!(result.error, None);
  }

  #[tokio::test]
  async fn test_failures_become_error_results() {
    let w = worker();

    let result = w.run_job(RuntimeKey::new(), job("nope", vec![])).await;
    assert_eq!(result.status, JobStatus::Error);
    assert!(result.error.unwrap().contains("unknown function 'nope'"));

    let result = w.run_job(RuntimeKey::new(), job("fail", vec![])).await;
    assert_eq!(result.status, JobStatus::Error);
    assert_eq!(result.result, serde_json::Value::Null);

    let result = w.run_job(RuntimeKey::new(), job("panic", vec![])).await;
    assert_eq!(result.status, JobStatus::Error);
    assert!(result.error.unwrap().contains("panicked"));

    let unresolved = job("add", vec![("x", Argument::Ref("m".to_string()))]);
    let result = w.run_job(RuntimeKey::new(), unresolved).await;
    assert_eq!(result.status, JobStatus::Error);
  }
}
