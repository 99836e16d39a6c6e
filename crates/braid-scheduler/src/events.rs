//! Job events and notifiers for observability.
//!
//! Events describe what happens to each attempt: it was started, it finished
//! (or failed), or provenance answered it without running anything. The
//! scheduler reports provenance outcomes itself; starts and results are teed
//! off the pipeline by [`observe`], so observing a run never changes what the
//! scheduler sees.

use std::sync::Arc;

use async_trait::async_trait;
use braid_pipeline::{
  Connection, MapSink, PipelineError, QueueSink, Siphon, Sink, Splice, patch, queue,
};
use braid_worker::{JobMessage, JobResult, JobStatus};
use braid_workflow::RuntimeKey;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// What happened to an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
  Start,
  Done,
  Error,
  Retrieved,
  Attached,
  Broken,
}

/// One observed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
  pub runtime_key: RuntimeKey,
  pub status: EventStatus,
  /// Known for events raised by the scheduler and for starts.
  pub node_id: Option<String>,
  /// The job (rendered display hint, or the job itself) for starts; the
  /// value otherwise.
  pub payload: serde_json::Value,
  pub error: Option<String>,
}

impl JobEvent {
  pub fn new(runtime_key: RuntimeKey, status: EventStatus, node_id: impl Into<String>) -> Self {
    Self {
      runtime_key,
      status,
      node_id: Some(node_id.into()),
      payload: serde_json::Value::Null,
      error: None,
    }
  }

  pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
    self.payload = payload;
    self
  }

  /// The event for a job entering the pipeline.
  pub fn started(message: &JobMessage) -> Self {
    let payload = match message.job.display() {
      Some(text) => serde_json::Value::String(text),
      None => serde_json::to_value(&message.job).unwrap_or_default(),
    };
    Self::new(message.key, EventStatus::Start, message.job.node_id.clone()).with_payload(payload)
  }

  /// The event for a result leaving the pipeline.
  pub fn finished(result: JobResult) -> Self {
    let status = match result.status {
      JobStatus::Ok => EventStatus::Done,
      JobStatus::Error => EventStatus::Error,
    };
    Self {
      runtime_key: result.key,
      status,
      node_id: None,
      payload: result.result,
      error: result.error,
    }
  }
}

/// Trait for receiving job events.
///
/// The scheduler calls `notify` for each event; implementations decide what
/// to do with them (log, display, forward, ignore).
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: JobEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: JobEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never holds up the scheduler; there is at
/// most a handful of events per job.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<JobEvent>) -> Self {
    Self { sender }
  }

  /// A notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: JobEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

/// Writes every event to the log, one line per event.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl ExecutionNotifier for LogNotifier {
  fn notify(&self, event: JobEvent) {
    let node_id = event.node_id.as_deref().unwrap_or("-");
    match event.status {
      EventStatus::Start => {
        info!(runtime_key = %event.runtime_key, node_id, job = %event.payload, "job_start")
      }
      EventStatus::Done => {
        info!(runtime_key = %event.runtime_key, result = %event.payload, "job_done")
      }
      EventStatus::Error => error!(
        runtime_key = %event.runtime_key,
        error = event.error.as_deref().unwrap_or("unknown error"),
        "job_error"
      ),
      EventStatus::Retrieved => {
        info!(runtime_key = %event.runtime_key, node_id, result = %event.payload, "job_retrieved")
      }
      EventStatus::Attached => info!(runtime_key = %event.runtime_key, node_id, "job_attached"),
      EventStatus::Broken => warn!(runtime_key = %event.runtime_key, node_id, "job_broken"),
    }
  }
}

/// A sink that hands every event to a notifier.
pub struct NotifierSink {
  notifier: Arc<dyn ExecutionNotifier>,
}

impl NotifierSink {
  pub fn new(notifier: Arc<dyn ExecutionNotifier>) -> Self {
    Self { notifier }
  }
}

#[async_trait]
impl Sink<JobEvent> for NotifierSink {
  async fn send(&mut self, item: JobEvent) -> Result<(), PipelineError> {
    self.notifier.notify(item);
    Ok(())
  }

  async fn close(&mut self) {}
}

/// The log queue of an observed connection and the task draining it.
pub struct LogHandle {
  sink: QueueSink<JobEvent>,
  task: JoinHandle<Result<usize, PipelineError>>,
}

impl LogHandle {
  /// Close the log queue and wait until every event has been delivered.
  ///
  /// Call after the observed connection is no longer used.
  pub async fn finish(mut self) -> Result<usize, PipelineError> {
    self.sink.close().await;
    self.task.await.map_err(|e| PipelineError::WorkerFailed {
      message: e.to_string(),
    })?
  }
}

/// Tee the starts and results of a connection into `notifier`.
///
/// Events go through a dedicated log queue drained by its own task, in the
/// order they pass through the pipeline.
///
/// Must be called from within a tokio runtime.
pub fn observe(
  connection: Connection<JobMessage, JobResult>,
  notifier: Arc<dyn ExecutionNotifier>,
  capacity: usize,
) -> (Connection<JobMessage, JobResult>, LogHandle) {
  let (log_sink, log_source) = queue(capacity);
  let task = tokio::spawn(patch(log_source, NotifierSink::new(notifier)));

  let jobs = Splice::new(connection.jobs, log_sink.clone(), JobEvent::started);
  let results = Siphon::new(
    connection.results,
    MapSink::new(log_sink.clone(), JobEvent::finished),
  );

  (
    Connection::new(jobs, results),
    LogHandle {
      sink: log_sink,
      task,
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use braid_pipeline::{Source, Worker, inline};
  use braid_workflow::{Hints, Job};
  use std::collections::BTreeMap;

  struct Echo;

  #[async_trait]
  impl Worker<JobMessage, JobResult> for Echo {
    async fn work(&self, message: JobMessage) -> JobResult {
      JobResult::ok(message.key, serde_json::json!(message.job.node_id))
    }
  }

  fn message(node_id: &str) -> JobMessage {
    JobMessage::new(
      RuntimeKey::new(),
      Job {
        node_id: node_id.to_string(),
        function: "echo".to_string(),
        arguments: BTreeMap::new(),
        hints: Hints {
          version: None,
          display: Some(format!("echo {}", node_id)),
        },
      },
    )
  }

  #[tokio::test]
  async fn test_observe_tees_starts_and_results() {
    let (notifier, mut events) = ChannelNotifier::channel();
    let echo: Arc<dyn Worker<JobMessage, JobResult>> = Arc::new(Echo);
    let (mut connection, log) = observe(inline(echo), Arc::new(notifier), 4);

    let first = message("a");
    let key = first.key;
    connection.jobs.send(first).await.unwrap();
    let result = connection.results.next().await.unwrap();
    assert_eq!(result.key, key);
    connection.jobs.close().await;
    drop(connection);

    assert_eq!(log.finish().await.unwrap(), 2);

    let start = events.recv().await.unwrap();
    assert_eq!(start.status, EventStatus::Start);
    assert_eq!(start.node_id.as_deref(), Some("a"));
    assert_eq!(start.payload, serde_json::json!("echo a"));

    let done = events.recv().await.unwrap();
    assert_eq!(done.status, EventStatus::Done);
    assert_eq!(done.runtime_key, key);
    assert_eq!(done.payload, serde_json::json!("a"));
  }

  #[test]
  fn test_finished_error_event() {
    let key = RuntimeKey::new();
    let event = JobEvent::finished(JobResult::error(key, "boom"));
    assert_eq!(event.status, EventStatus::Error);
    assert_eq!(event.error.as_deref(), Some("boom"));
    assert_eq!(event.node_id, None);
  }
}
