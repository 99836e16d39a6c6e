//! Ready-made runners.
//!
//! Each runner wires a [`Scheduler`] to a worker in one of the usual shapes:
//! on the caller's task or on a pool of tasks, with or without a display.

use std::sync::Arc;

use braid_pipeline::{Worker, WorkerPool, inline};
use braid_worker::{JobMessage, JobResult};
use braid_workflow::Workflow;
use tracing::warn;

use crate::error::SchedulerError;
use crate::events::{ExecutionNotifier, LogHandle, observe};
use crate::scheduler::Scheduler;

/// Run on the caller's task. A job runs each time the scheduler pulls a result.
pub async fn run_single(
  scheduler: &Scheduler,
  worker: Arc<dyn Worker<JobMessage, JobResult>>,
  workflow: &Workflow,
) -> Result<serde_json::Value, SchedulerError> {
  scheduler.run(inline(worker), workflow).await
}

/// Like [`run_single`], reporting every start, result and provenance outcome
/// to `display`.
pub async fn run_single_with_display(
  scheduler: Scheduler,
  worker: Arc<dyn Worker<JobMessage, JobResult>>,
  workflow: &Workflow,
  display: Arc<dyn ExecutionNotifier>,
) -> Result<serde_json::Value, SchedulerError> {
  let scheduler = scheduler.with_notifier(display.clone());
  let (connection, log) = observe(inline(worker), display, scheduler.max_in_flight());

  let result = scheduler.run(connection, workflow).await;
  finish_log(log).await;
  result
}

/// Run on `workers` parallel tasks sharing one job queue.
pub async fn run_parallel(
  scheduler: &Scheduler,
  worker: Arc<dyn Worker<JobMessage, JobResult>>,
  workflow: &Workflow,
  workers: usize,
) -> Result<serde_json::Value, SchedulerError> {
  let (connection, pool) = WorkerPool::replicate(worker, workers, scheduler.max_in_flight());

  let result = scheduler.run(connection, workflow).await;
  let joined = pool.join().await;
  let value = result?;
  joined?;
  Ok(value)
}

/// Like [`run_parallel`], with a display fed from a dedicated log queue so
/// events arriving from several workers are delivered one at a time.
pub async fn run_parallel_with_display(
  scheduler: Scheduler,
  worker: Arc<dyn Worker<JobMessage, JobResult>>,
  workflow: &Workflow,
  workers: usize,
  display: Arc<dyn ExecutionNotifier>,
) -> Result<serde_json::Value, SchedulerError> {
  let scheduler = scheduler.with_notifier(display.clone());
  let capacity = scheduler.max_in_flight();
  let (connection, pool) = WorkerPool::replicate(worker, workers, capacity);
  let (connection, log) = observe(connection, display, capacity);

  let result = scheduler.run(connection, workflow).await;
  let joined = pool.join().await;
  finish_log(log).await;
  let value = result?;
  joined?;
  Ok(value)
}

async fn finish_log(log: LogHandle) {
  if let Err(e) = log.finish().await {
    warn!(error = %e, "display_log_failed");
  }
}
