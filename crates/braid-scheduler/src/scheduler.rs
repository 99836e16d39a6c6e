//! The scheduler loop.
//!
//! One run owns all graph state and mutates it from a single task. It only
//! suspends on reading the next result (or, when nothing is in flight, on the
//! next provenance completion it is waiting for).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use braid_pipeline::{Connection, Sink, Source};
use braid_provenance::{Completion, JobDb, Outcome, RegistrationStatus};
use braid_worker::{JobMessage, JobResult, JobStatus};
use braid_workflow::{Graph, Job, RuntimeKey, Workflow};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::error::SchedulerError;
use crate::events::{EventStatus, ExecutionNotifier, JobEvent, NoopNotifier};
use crate::handler::{AbortOnError, ErrorAction, ErrorHandler};

const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Lifecycle of one node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
  /// Some arguments are still waiting for upstream results.
  Pending,
  /// Every argument is a value.
  Ready,
  /// Sent to a worker.
  Dispatched,
  /// Attached to another attempt with the same provenance.
  Waiting,
  Done,
  Failed,
}

/// Runs workflows over a connection to workers.
pub struct Scheduler {
  provenance: Option<Arc<JobDb>>,
  error_handler: Arc<dyn ErrorHandler>,
  notifier: Arc<dyn ExecutionNotifier>,
  max_in_flight: usize,
}

impl Default for Scheduler {
  fn default() -> Self {
    Self::new()
  }
}

impl Scheduler {
  /// A scheduler without provenance that aborts on the first failure.
  pub fn new() -> Self {
    Self {
      provenance: None,
      error_handler: Arc::new(AbortOnError),
      notifier: Arc::new(NoopNotifier),
      max_in_flight: DEFAULT_MAX_IN_FLIGHT,
    }
  }

  /// Look every job up in `db` before running it.
  pub fn with_provenance(mut self, db: Arc<JobDb>) -> Self {
    self.provenance = Some(db);
    self
  }

  pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
    self.error_handler = handler;
    self
  }

  /// Receive retrieved, attached and broken events.
  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Cap on jobs sent but not yet answered. Keep it at or below the
  /// connection's buffering so sending never waits on unread results.
  pub fn with_max_in_flight(mut self, max: usize) -> Self {
    self.max_in_flight = max.max(1);
    self
  }

  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight
  }

  pub fn notifier(&self) -> &Arc<dyn ExecutionNotifier> {
    &self.notifier
  }

  /// Run `workflow` to its root value.
  ///
  /// The job sink is closed when the run ends, whatever the outcome, so pools
  /// behind the connection wind down.
  #[instrument(
    name = "workflow_run",
    skip(self, connection, workflow),
    fields(workflow_id = %workflow.workflow_id, root = %workflow.root)
  )]
  pub async fn run(
    &self,
    connection: Connection<JobMessage, JobResult>,
    workflow: &Workflow,
  ) -> Result<serde_json::Value, SchedulerError> {
    info!("workflow_started");

    let Connection {
      mut jobs,
      mut results,
    } = connection;
    let completions = self.provenance.as_ref().map(|db| db.subscribe());

    let mut run = Run::new(self, workflow, completions);
    let outcome = run.drive(jobs.as_mut(), results.as_mut()).await;
    if outcome.is_err() {
      run.release_outstanding().await;
    }

    // Results nobody reads must not hold up workers draining the job queue
    drop(results);
    jobs.close().await;

    match &outcome {
      Ok(value) => info!(result = %value, "workflow_completed"),
      Err(e) => error!(error = %e, "workflow_failed"),
    }
    outcome
  }
}

/// Graph state of one run.
struct Run<'a> {
  scheduler: &'a Scheduler,
  workflow: &'a Workflow,
  graph: Graph,
  required: HashSet<String>,
  jobs: HashMap<String, Job>,
  states: HashMap<String, NodeState>,
  remaining: HashMap<String, usize>,
  ready: VecDeque<String>,
  /// Attempts sent to the pipeline, by runtime key.
  dispatched: HashMap<RuntimeKey, String>,
  /// Attempts attached to another owner: key -> (node, owner).
  waiting: HashMap<RuntimeKey, (String, RuntimeKey)>,
  completions: Option<broadcast::Receiver<Completion>>,
  root_value: Option<serde_json::Value>,
}

impl<'a> Run<'a> {
  fn new(
    scheduler: &'a Scheduler,
    workflow: &'a Workflow,
    completions: Option<broadcast::Receiver<Completion>>,
  ) -> Self {
    let graph = workflow.graph();
    let required = workflow.required_nodes();

    let mut jobs = HashMap::with_capacity(required.len());
    let mut states = HashMap::with_capacity(required.len());
    let mut remaining = HashMap::with_capacity(required.len());
    let mut ready = VecDeque::new();

    let mut order: Vec<&String> = required.iter().collect();
    order.sort();
    for node_id in order {
      let Some(node) = workflow.get_node(node_id) else {
        continue;
      };
      let count = graph.dependency_count(node_id);
      jobs.insert(node_id.clone(), Job::from_node(node));
      remaining.insert(node_id.clone(), count);
      if count == 0 {
        states.insert(node_id.clone(), NodeState::Ready);
        ready.push_back(node_id.clone());
      } else {
        states.insert(node_id.clone(), NodeState::Pending);
      }
    }

    Self {
      scheduler,
      workflow,
      graph,
      required,
      jobs,
      states,
      remaining,
      ready,
      dispatched: HashMap::new(),
      waiting: HashMap::new(),
      completions,
      root_value: None,
    }
  }

  async fn drive(
    &mut self,
    sink: &mut dyn Sink<JobMessage>,
    source: &mut dyn Source<JobResult>,
  ) -> Result<serde_json::Value, SchedulerError> {
    loop {
      while self.dispatched.len() < self.scheduler.max_in_flight {
        let Some(node_id) = self.ready.pop_front() else {
          break;
        };
        self.dispatch(node_id, sink).await?;
      }

      if let Some(value) = self.root_value.take() {
        return Ok(value);
      }

      self.poll_completions().await?;
      let can_dispatch =
        !self.ready.is_empty() && self.dispatched.len() < self.scheduler.max_in_flight;
      if can_dispatch || self.root_value.is_some() {
        continue;
      }

      if !self.dispatched.is_empty() {
        match source.next().await {
          Some(result) => self.handle_result(result).await?,
          None => {
            return Err(SchedulerError::PipelineClosed {
              outstanding: self.dispatched.len(),
            });
          }
        }
      } else if !self.waiting.is_empty() {
        self.wait_completion().await?;
      } else {
        return Err(SchedulerError::Stalled {
          root: self.workflow.root.clone(),
        });
      }
    }
  }

  async fn dispatch(
    &mut self,
    node_id: String,
    sink: &mut dyn Sink<JobMessage>,
  ) -> Result<(), SchedulerError> {
    let Some(job) = self.jobs.get(&node_id).cloned() else {
      return Ok(());
    };
    self.states.insert(node_id.clone(), NodeState::Dispatched);

    let scheduler = self.scheduler;
    let key = match &scheduler.provenance {
      None => RuntimeKey::new(),
      Some(db) => {
        let record = db.register(&job)?;
        let key = record.runtime_key;
        let registration = db.add_job_to_db(record).await?;

        match registration.status {
          RegistrationStatus::Retrieved => {
            let value = registration.value.unwrap_or_default();
            self.notify(
              JobEvent::new(key, EventStatus::Retrieved, &node_id).with_payload(value.clone()),
            );
            self.complete(&node_id, value);
            return Ok(());
          }
          RegistrationStatus::Attached => {
            self.notify(JobEvent::new(key, EventStatus::Attached, &node_id));
            self.states.insert(node_id.clone(), NodeState::Waiting);
            self.waiting.insert(key, (node_id, registration.owner));
            return Ok(());
          }
          RegistrationStatus::Broken => {
            self.notify(JobEvent::new(key, EventStatus::Broken, &node_id));
            key
          }
          RegistrationStatus::Initialized => key,
        }
      }
    };

    debug!(runtime_key = %key, node_id = %node_id, function = %job.function, "job_dispatched");
    // Tracked before sending so a failed send is released with the rest.
    self.dispatched.insert(key, node_id);
    sink.send(JobMessage::new(key, job)).await?;

    if let Some(db) = &scheduler.provenance {
      db.add_time_stamp(key, "dispatch").await?;
    }
    Ok(())
  }

  async fn handle_result(&mut self, result: JobResult) -> Result<(), SchedulerError> {
    let Some(node_id) = self.dispatched.remove(&result.key) else {
      warn!(runtime_key = %result.key, "result_for_unknown_key");
      return Ok(());
    };
    let scheduler = self.scheduler;

    match result.status {
      JobStatus::Ok => {
        debug!(runtime_key = %result.key, node_id = %node_id, "job_completed");
        let waiters = match &scheduler.provenance {
          Some(db) => db.store_result_in_db(result.key, result.result.clone()).await?,
          None => Vec::new(),
        };
        self.complete(&node_id, result.result.clone());
        self.resume(&waiters, &result.result);
        Ok(())
      }
      JobStatus::Error => {
        let message = result
          .error
          .unwrap_or_else(|| "job failed without a message".to_string());
        error!(runtime_key = %result.key, node_id = %node_id, error = %message, "job_failed");

        let waiters = match &scheduler.provenance {
          Some(db) => db.abandon(result.key, message.clone()).await?,
          None => Vec::new(),
        };
        let value = self.fail(&node_id, message)?;
        self.resume(&waiters, &value);
        Ok(())
      }
    }
  }

  /// Ask the error handler what to do with a failed node.
  fn fail(&mut self, node_id: &str, message: String) -> Result<serde_json::Value, SchedulerError> {
    let action = match self.jobs.get(node_id) {
      Some(job) => self.scheduler.error_handler.on_error(job, &message),
      None => ErrorAction::Abort,
    };

    match action {
      ErrorAction::Abort => {
        self.states.insert(node_id.to_string(), NodeState::Failed);
        Err(SchedulerError::JobFailed {
          node_id: node_id.to_string(),
          message,
        })
      }
      ErrorAction::Substitute(value) => {
        self.complete(node_id, value.clone());
        Ok(value)
      }
    }
  }

  /// Resolve attempts of this run that were attached to a finished owner.
  fn resume(&mut self, waiters: &[RuntimeKey], value: &serde_json::Value) {
    for key in waiters {
      if let Some((node_id, _)) = self.waiting.remove(key) {
        debug!(runtime_key = %key, node_id = %node_id, "waiter_resumed");
        self.complete(&node_id, value.clone());
      }
    }
  }

  /// Put waiters whose owner went away without failing back on the ready
  /// queue. Their next dispatch registers a fresh attempt.
  fn requeue(&mut self, waiters: &[RuntimeKey]) {
    for key in waiters {
      if let Some((node_id, owner)) = self.waiting.remove(key) {
        info!(runtime_key = %key, owner = %owner, node_id = %node_id, "waiter_requeued");
        self.states.insert(node_id.clone(), NodeState::Ready);
        self.ready.push_back(node_id);
      }
    }
  }

  fn apply_completion(&mut self, completion: Completion) -> Result<(), SchedulerError> {
    match completion.outcome {
      Outcome::Stored(value) => self.resume(&completion.waiters, &value),
      Outcome::Failed(message) => {
        for key in &completion.waiters {
          if let Some((node_id, _)) = self.waiting.remove(key) {
            self.fail(&node_id, message.clone())?;
          }
        }
      }
      Outcome::Released => self.requeue(&completion.waiters),
    }
    Ok(())
  }

  /// Apply completions that have already been published.
  async fn poll_completions(&mut self) -> Result<(), SchedulerError> {
    if self.waiting.is_empty() {
      // Keep the backlog short; nothing here can concern this run.
      if let Some(receiver) = &mut self.completions {
        while receiver.try_recv().is_ok() {}
      }
      return Ok(());
    }

    loop {
      let Some(receiver) = &mut self.completions else {
        return Ok(());
      };
      match receiver.try_recv() {
        Ok(completion) => self.apply_completion(completion)?,
        Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
          warn!(skipped, "completions_lagged");
          self.resync_waiting().await?;
        }
        Err(_) => return Ok(()),
      }
    }
  }

  /// Block until a completion arrives. Only called with nothing in flight.
  async fn wait_completion(&mut self) -> Result<(), SchedulerError> {
    let Some(receiver) = &mut self.completions else {
      return Err(SchedulerError::Stalled {
        root: self.workflow.root.clone(),
      });
    };
    match receiver.recv().await {
      Ok(completion) => self.apply_completion(completion),
      Err(broadcast::error::RecvError::Lagged(skipped)) => {
        warn!(skipped, "completions_lagged");
        self.resync_waiting().await
      }
      Err(broadcast::error::RecvError::Closed) => Err(SchedulerError::Stalled {
        root: self.workflow.root.clone(),
      }),
    }
  }

  /// Check every waiting attempt against the database after missed completions.
  async fn resync_waiting(&mut self) -> Result<(), SchedulerError> {
    let Some(db) = self.scheduler.provenance.clone() else {
      return Ok(());
    };

    let waiting: Vec<(RuntimeKey, RuntimeKey)> = self
      .waiting
      .iter()
      .map(|(key, (_, owner))| (*key, *owner))
      .collect();

    for (key, owner) in waiting {
      match db.record(&owner).await? {
        Some(record) => {
          if let Some(value) = record.result {
            self.resume(&[key], &value);
          }
        }
        None => self.requeue(&[key]),
      }
    }
    Ok(())
  }

  /// Record a node's value and release the consumers it completes.
  fn complete(&mut self, node_id: &str, value: serde_json::Value) {
    self.states.insert(node_id.to_string(), NodeState::Done);

    for link in self.graph.downstream(node_id) {
      if !self.required.contains(&link.node_id) {
        continue;
      }
      if let Some(job) = self.jobs.get_mut(&link.node_id) {
        job.resolve(&link.slot, value.clone());
      }
      if let Some(count) = self.remaining.get_mut(&link.node_id) {
        *count = count.saturating_sub(1);
        if *count == 0 && self.states.get(&link.node_id) == Some(&NodeState::Pending) {
          self.states.insert(link.node_id.clone(), NodeState::Ready);
          self.ready.push_back(link.node_id.clone());
        }
      }
    }

    if node_id == self.workflow.root {
      self.root_value = Some(value);
    }
  }

  /// Drop attempts this run still owns, so others waiting on them run the
  /// job themselves.
  async fn release_outstanding(&mut self) {
    let scheduler = self.scheduler;
    let Some(db) = &scheduler.provenance else {
      return;
    };
    for (key, node_id) in self.dispatched.drain() {
      if let Err(e) = db.release(key).await {
        warn!(runtime_key = %key, node_id = %node_id, error = %e, "release_failed");
      }
    }
  }

  fn notify(&self, event: JobEvent) {
    self.scheduler.notifier.notify(event);
  }
}
