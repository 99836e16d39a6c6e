use async_trait::async_trait;
use braid_workflow::{ProvenanceKey, RuntimeKey};

use crate::{JobRecord, Store, StoreError};

/// In-memory store implementation.
///
/// Suitable for single-process use or testing. Records keep insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
  records: Vec<JobRecord>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn insert(&mut self, record: &JobRecord) -> Result<(), StoreError> {
    self.records.push(record.clone());
    Ok(())
  }

  async fn find_by_provenance(
    &self,
    provenance: &ProvenanceKey,
  ) -> Result<Option<JobRecord>, StoreError> {
    Ok(
      self
        .records
        .iter()
        .find(|r| &r.provenance == provenance)
        .cloned(),
    )
  }

  async fn find_by_key(&self, key: &RuntimeKey) -> Result<Option<JobRecord>, StoreError> {
    Ok(self.records.iter().find(|r| &r.runtime_key == key).cloned())
  }

  async fn update(&mut self, record: &JobRecord) -> Result<bool, StoreError> {
    match self
      .records
      .iter_mut()
      .find(|r| r.runtime_key == record.runtime_key)
    {
      Some(existing) => {
        *existing = record.clone();
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn remove(&mut self, key: &RuntimeKey) -> Result<bool, StoreError> {
    let before = self.records.len();
    self.records.retain(|r| &r.runtime_key != key);
    Ok(self.records.len() < before)
  }

  async fn count(&self) -> Result<usize, StoreError> {
    Ok(self.records.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn record(prov: &str) -> JobRecord {
    JobRecord::new(
      RuntimeKey::new(),
      ProvenanceKey::new(prov),
      "add",
      json!({"x": 1, "y": 2}),
      None,
    )
  }

  #[tokio::test]
  async fn test_memory_store() {
    let mut store = MemoryStore::new();
    let rec = record("abc");

    assert!(store.find_by_provenance(&rec.provenance).await.unwrap().is_none());

    store.insert(&rec).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(
      store.find_by_provenance(&rec.provenance).await.unwrap(),
      Some(rec.clone())
    );

    let mut done = rec.clone();
    done.result = Some(json!(3));
    assert!(store.update(&done).await.unwrap());
    assert_eq!(
      store.find_by_key(&rec.runtime_key).await.unwrap().unwrap().result,
      Some(json!(3))
    );

    assert!(store.remove(&rec.runtime_key).await.unwrap());
    assert!(!store.remove(&rec.runtime_key).await.unwrap());
    assert_eq!(store.count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_update_missing_record() {
    let mut store = MemoryStore::new();
    assert!(!store.update(&record("abc")).await.unwrap());
  }
}
