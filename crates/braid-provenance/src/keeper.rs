use std::collections::HashSet;

use braid_workflow::RuntimeKey;
use tokio::sync::Mutex;

/// The set of attempts currently running in this process.
///
/// A record whose owner is not in this set and has no result was left behind
/// by an attempt that died. Share one keeper (behind an `Arc`) between job
/// databases that should see each other's work as running.
#[derive(Debug, Default)]
pub struct JobKeeper {
  running: Mutex<HashSet<RuntimeKey>>,
}

impl JobKeeper {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn insert(&self, key: RuntimeKey) {
    self.running.lock().await.insert(key);
  }

  pub async fn remove(&self, key: &RuntimeKey) -> bool {
    self.running.lock().await.remove(key)
  }

  pub async fn contains(&self, key: &RuntimeKey) -> bool {
    self.running.lock().await.contains(key)
  }

  pub async fn len(&self) -> usize {
    self.running.lock().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.running.lock().await.is_empty()
  }
}
