use std::sync::Arc;

use braid_store::{JobRecord, Store};
use braid_workflow::{Job, ProvenanceKey, RuntimeKey};
use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::{JobKeeper, ProvenanceError, prov_key};

const COMPLETION_CAPACITY: usize = 256;

/// Outcome of looking up a new attempt in the job database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
  /// No record existed. The attempt owns a new record and must run.
  Initialized,
  /// Another attempt with the same provenance is running. Wait for it.
  Attached,
  /// A result is stored. Nothing needs to run.
  Retrieved,
  /// A stale record was replaced. The attempt owns the new record and must run.
  Broken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
  pub status: RegistrationStatus,
  /// Owner of the record: the attempt itself when it must run, otherwise the
  /// attempt that ran (or is running) the computation.
  pub owner: RuntimeKey,
  /// The stored result, for `Retrieved` only.
  pub value: Option<serde_json::Value>,
}

impl Registration {
  /// Whether the attempt has to be executed.
  pub fn must_run(&self) -> bool {
    matches!(
      self.status,
      RegistrationStatus::Initialized | RegistrationStatus::Broken
    )
  }
}

/// How an owner finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  /// The result was stored.
  Stored(serde_json::Value),
  /// The job itself failed with this message.
  Failed(String),
  /// The owner's run stopped before the job finished. The job did not fail
  /// and waiters may run it themselves.
  Released,
}

/// Published whenever an owner finishes, so attempts waiting on it can resume.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
  pub owner: RuntimeKey,
  pub waiters: Vec<RuntimeKey>,
  pub outcome: Outcome,
}

/// The provenance database.
///
/// Every method that reads and then writes the store holds one lock for the
/// duration of that call. Two successive calls are not atomic together.
pub struct JobDb {
  store: Mutex<Box<dyn Store>>,
  keeper: Arc<JobKeeper>,
  completions: broadcast::Sender<Completion>,
}

impl JobDb {
  /// Open a job database with a fresh running set.
  pub fn open(store: impl Store + 'static) -> Self {
    Self::with_keeper(store, Arc::new(JobKeeper::new()))
  }

  pub fn with_keeper(store: impl Store + 'static, keeper: Arc<JobKeeper>) -> Self {
    let (completions, _) = broadcast::channel(COMPLETION_CAPACITY);
    Self {
      store: Mutex::new(Box::new(store)),
      keeper,
      completions,
    }
  }

  pub fn keeper(&self) -> &Arc<JobKeeper> {
    &self.keeper
  }

  /// Receive a [`Completion`] for every result stored or attempt abandoned
  /// from now on.
  pub fn subscribe(&self) -> broadcast::Receiver<Completion> {
    self.completions.subscribe()
  }

  /// Mint a runtime key for a new attempt of `job` and hash its content.
  ///
  /// Nothing is written; pass the record to [`JobDb::add_job_to_db`].
  pub fn register(&self, job: &Job) -> Result<JobRecord, ProvenanceError> {
    let provenance = prov_key(job)?;
    let arguments = serde_json::to_value(job.resolved_arguments()?)?;

    Ok(JobRecord::new(
      RuntimeKey::new(),
      provenance,
      job.function.clone(),
      arguments,
      job.hints.version.clone(),
    ))
  }

  /// Look up an attempt by its provenance and record it.
  pub async fn add_job_to_db(&self, record: JobRecord) -> Result<Registration, ProvenanceError> {
    let key = record.runtime_key;
    let mut store = self.store.lock().await;

    let Some(mut existing) = store.find_by_provenance(&record.provenance).await? else {
      store.insert(&record).await?;
      self.keeper.insert(key).await;
      debug!(runtime_key = %key, provenance = %record.provenance, "provenance_initialized");
      return Ok(Registration {
        status: RegistrationStatus::Initialized,
        owner: key,
        value: None,
      });
    };

    if let Some(value) = existing.result.take() {
      info!(
        runtime_key = %key,
        owner = %existing.runtime_key,
        provenance = %record.provenance,
        "provenance_retrieved"
      );
      return Ok(Registration {
        status: RegistrationStatus::Retrieved,
        owner: existing.runtime_key,
        value: Some(value),
      });
    }

    // The same attempt submitted twice still owns its record.
    if existing.runtime_key == key {
      self.keeper.insert(key).await;
      debug!(runtime_key = %key, provenance = %record.provenance, "provenance_resubmitted");
      return Ok(Registration {
        status: RegistrationStatus::Initialized,
        owner: key,
        value: None,
      });
    }

    if self.keeper.contains(&existing.runtime_key).await {
      if !existing.attached.contains(&key) {
        existing.attached.push(key);
        store.update(&existing).await?;
      }
      info!(
        runtime_key = %key,
        owner = %existing.runtime_key,
        provenance = %record.provenance,
        "provenance_attached"
      );
      return Ok(Registration {
        status: RegistrationStatus::Attached,
        owner: existing.runtime_key,
        value: None,
      });
    }

    warn!(
      runtime_key = %key,
      stale_owner = %existing.runtime_key,
      provenance = %record.provenance,
      "provenance_broken"
    );
    store.remove(&existing.runtime_key).await?;
    store.insert(&record).await?;
    self.keeper.insert(key).await;

    Ok(Registration {
      status: RegistrationStatus::Broken,
      owner: key,
      value: None,
    })
  }

  /// Store the result of an owner and return the attempts attached to it.
  ///
  /// Unknown keys and records that already hold a result are left alone and
  /// yield no waiters.
  pub async fn store_result_in_db(
    &self,
    key: RuntimeKey,
    value: serde_json::Value,
  ) -> Result<Vec<RuntimeKey>, ProvenanceError> {
    let mut store = self.store.lock().await;
    self.keeper.remove(&key).await;

    let Some(mut record) = store.find_by_key(&key).await? else {
      debug!(runtime_key = %key, "store_result_unknown_key");
      return Ok(Vec::new());
    };
    if record.is_done() {
      debug!(runtime_key = %key, "store_result_duplicate");
      return Ok(Vec::new());
    }

    record.time.insert("done".to_string(), Utc::now());
    record.result = Some(value.clone());
    store.update(&record).await?;
    drop(store);

    debug!(runtime_key = %key, waiters = record.attached.len(), "result_stored");
    self.publish(Completion {
      owner: key,
      waiters: record.attached.clone(),
      outcome: Outcome::Stored(value),
    });

    Ok(record.attached)
  }

  /// Give up on an owner that failed: its record is removed so a later attempt
  /// runs again, and its waiters are returned.
  pub async fn abandon(
    &self,
    key: RuntimeKey,
    message: impl Into<String>,
  ) -> Result<Vec<RuntimeKey>, ProvenanceError> {
    let message = message.into();
    let Some(waiters) = self.remove_unfinished(key).await? else {
      return Ok(Vec::new());
    };

    warn!(runtime_key = %key, waiters = waiters.len(), error = %message, "job_abandoned");
    self.publish(Completion {
      owner: key,
      waiters: waiters.clone(),
      outcome: Outcome::Failed(message),
    });

    Ok(waiters)
  }

  /// Drop an owner whose run stopped before its job finished. Like
  /// [`JobDb::abandon`], but waiters are told to run the job themselves.
  pub async fn release(&self, key: RuntimeKey) -> Result<Vec<RuntimeKey>, ProvenanceError> {
    let Some(waiters) = self.remove_unfinished(key).await? else {
      return Ok(Vec::new());
    };

    info!(runtime_key = %key, waiters = waiters.len(), "job_released");
    self.publish(Completion {
      owner: key,
      waiters: waiters.clone(),
      outcome: Outcome::Released,
    });

    Ok(waiters)
  }

  /// Remove the record owned by `key` unless it holds a result. Returns its
  /// waiters, or `None` when there was nothing to remove.
  async fn remove_unfinished(
    &self,
    key: RuntimeKey,
  ) -> Result<Option<Vec<RuntimeKey>>, ProvenanceError> {
    let mut store = self.store.lock().await;
    self.keeper.remove(&key).await;

    match store.find_by_key(&key).await? {
      Some(record) if !record.is_done() => {
        store.remove(&key).await?;
        Ok(Some(record.attached))
      }
      _ => Ok(None),
    }
  }

  /// Record a named instant on the record owned by `key`. A missing record
  /// is not an error.
  pub async fn add_time_stamp(&self, key: RuntimeKey, name: &str) -> Result<(), ProvenanceError> {
    let mut store = self.store.lock().await;
    if let Some(mut record) = store.find_by_key(&key).await? {
      record.time.insert(name.to_string(), Utc::now());
      store.update(&record).await?;
    }
    Ok(())
  }

  pub async fn job_exists(&self, provenance: &ProvenanceKey) -> Result<bool, ProvenanceError> {
    let store = self.store.lock().await;
    Ok(store.find_by_provenance(provenance).await?.is_some())
  }

  /// Fetch the record owned by `key`.
  pub async fn record(&self, key: &RuntimeKey) -> Result<Option<JobRecord>, ProvenanceError> {
    let store = self.store.lock().await;
    Ok(store.find_by_key(key).await?)
  }

  fn publish(&self, completion: Completion) {
    // No subscribers is fine.
    let _ = self.completions.send(completion);
  }
}
